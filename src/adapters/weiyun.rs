//! Adapter for Weiyun shares (cookie-token protocol shape).
//!
//! Weiyun keys its JSON API on a `wyctoken` cookie harvested from the share
//! page itself, echoed back as the `g_tk` query parameter. Requests are
//! double-wrapped envelopes: `req_header`/`req_body` strings carrying an
//! inner `ReqMsg_body` object. Download URLs come from a batch endpoint and
//! must be fetched with replay headers (an `FTN5K` cookie derived from the
//! file hash, the browser user-agent, and the share referer) or the CDN
//! rejects the transfer.

use std::sync::LazyLock;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use dashmap::DashMap;
use rand::Rng;
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::{Adapter, AdapterContext, ResolveStep, wire_error};
use crate::engine::channel::{Resolved, ResolvedLink};
use crate::engine::error::ResolveError;
use crate::engine::walker::{DirectoryWalker, FolderPage, FolderRef, FolderSource};
use crate::model::{FileDescriptor, Provider, ShareDescriptor, extras_keys};
use crate::transport::{Transport, as_text};

static WYCTOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"wyctoken=([^;\s]+)").unwrap()
});

const VIEW_PATH: &str = "/webapp/json/weiyunShare/WeiyunShareView";
const DIR_LIST_PATH: &str = "/webapp/json/weiyunShareNoLogin/WeiyunShareDirList";
const DOWNLOAD_PATH: &str = "/webapp/json/weiyunShare/WeiyunShareBatchDownload";

const VIEW_CMD: i64 = 12002;
const DOWNLOAD_CMD: i64 = 12024;
const DIR_LIST_CMD: i64 = 12031;

/// Directory pages are requested in chunks of this size.
const DIR_PAGE_COUNT: usize = 100;

/// Resolves `share.weiyun.com` links.
#[derive(Debug)]
pub struct WeiyunAdapter {
    base: String,
    ctx: AdapterContext,
}

impl WeiyunAdapter {
    #[must_use]
    pub fn new(ctx: AdapterContext) -> Self {
        Self {
            base: "https://share.weiyun.com".to_string(),
            ctx,
        }
    }

    /// Test constructor pointing every endpoint at `base`.
    #[must_use]
    pub fn with_base_url(base: &str, ctx: AdapterContext) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            ctx,
        }
    }

    fn open_session(&self, share: &ShareDescriptor) -> Result<WeiyunSession, ResolveError> {
        let mut config = self.ctx.transport.clone();
        if let Some(proxy) = share.extras().get_str(extras_keys::PROXY) {
            config.proxy = Some(proxy);
        }
        let context = share.base_msg();
        let transport =
            Transport::open(&config).map_err(|e| ResolveError::provider(&context, e.to_string()))?;
        // A caller-supplied cookie (month-long login session) rides along on
        // every request and may already contain the wyctoken.
        let cookie = share
            .extras()
            .get(extras_keys::AUTHS)
            .and_then(|auths| auths["cookie"].as_str().map(ToString::to_string))
            .filter(|cookie| !cookie.is_empty());
        Ok(WeiyunSession {
            transport,
            base: self.base.clone(),
            referer: format!("{}/{}", self.base, share.share_key()),
            cookie,
            context,
        })
    }

    /// Fetches the share view: the root file/dir listing behind the token.
    async fn fetch_view(
        &self,
        session: &WeiyunSession,
        share: &ShareDescriptor,
        g_tk: &str,
    ) -> Result<Value, ResolveError> {
        let body = json!({
            "share_pwd": share.password(),
            "share_key": share.share_key(),
        });
        session
            .post_envelope(
                VIEW_PATH,
                g_tk,
                VIEW_CMD,
                ".weiyun.WeiyunShareViewMsgReq_body",
                body,
                false,
            )
            .await
    }

    /// Exchanges one file entry for its direct download URL plus the replay
    /// headers the caller must send when fetching it.
    async fn fetch_download(
        &self,
        session: &WeiyunSession,
        g_tk: &str,
        share_key: &str,
        share_pwd: &str,
        entry: &DownloadEntry,
    ) -> Result<Resolved, ResolveError> {
        let body = json!({
            "share_key": share_key,
            "pwd": share_pwd,
            "file_owner": null,
            "download_type": 0,
            "file_list": [{
                "pdir_key": entry.pdir_key,
                "file_id": entry.file_id,
                "filename": entry.filename,
                "file_size": entry.file_size,
            }],
        });
        let rsp = session
            .post_envelope(
                DOWNLOAD_PATH,
                g_tk,
                DOWNLOAD_CMD,
                ".weiyun.WeiyunShareBatchDownloadMsgReq_body",
                body,
                true,
            )
            .await?;
        let Some(file) = rsp["file_list"].as_array().and_then(|list| {
            list.iter()
                .find(|file| file["retcode"].as_i64() == Some(0))
        }) else {
            return Err(ResolveError::NoDownloadLink {
                context: session.context.clone(),
            });
        };
        let Some(url) = file["https_download_url"].as_str() else {
            return Err(ResolveError::NoDownloadLink {
                context: session.context.clone(),
            });
        };
        let headers = replay_headers(
            file["file_sha"].as_str(),
            &self.ctx.transport.user_agent,
            &self.base,
        );
        debug!(provider = "weiyun", "download link resolved with replay headers");
        Ok(Resolved::Link(ResolvedLink::with_headers(url, headers)))
    }
}

#[async_trait]
impl Adapter for WeiyunAdapter {
    fn name(&self) -> &str {
        "weiyun"
    }

    fn provider(&self) -> Provider {
        Provider::Weiyun
    }

    async fn resolve(&self, share: &ShareDescriptor) -> Result<ResolveStep, ResolveError> {
        let context = share.base_msg();
        if share.share_key().is_empty() {
            return Err(ResolveError::EmptyShare {
                context,
                share_key: String::new(),
            });
        }
        let session = self.open_session(share)?;
        let g_tk = session.harvest_token(share.share_key()).await?;
        let view = self.fetch_view(&session, share, &g_tk).await?;

        let files = view["file_list"].as_array().cloned().unwrap_or_default();
        if files.is_empty() {
            // A share whose root is a folder re-enters via the listing path.
            if let Some(dir) = view["dir_list"].as_array().and_then(|dirs| dirs.first()) {
                let folder_id = dir["dir_key"].as_str().unwrap_or_default().to_string();
                return Ok(ResolveStep::Done(Resolved::Folder { folder_id }));
            }
            return Err(ResolveError::EmptyShare {
                context,
                share_key: share.share_key().to_string(),
            });
        }
        let entry = DownloadEntry::from_listing(&files[0], "");
        let resolved = self
            .fetch_download(&session, &g_tk, share.share_key(), share.password(), &entry)
            .await?;
        if let Resolved::Link(link) = &resolved {
            share.extras().set(extras_keys::DOWNLOAD_URL, json!(link.url));
            share.extras().set(
                extras_keys::DOWNLOAD_HEADERS,
                serde_json::to_value(&link.headers).unwrap_or(Value::Null),
            );
        }
        Ok(ResolveStep::Done(resolved))
    }

    async fn list_files(
        &self,
        share: &ShareDescriptor,
    ) -> Result<Vec<FileDescriptor>, ResolveError> {
        let session = self.open_session(share)?;
        let g_tk = session.harvest_token(share.share_key()).await?;
        let domain = share
            .extras()
            .get_str(extras_keys::DOMAIN_NAME)
            .unwrap_or_else(|| self.ctx.deferred_base.clone());
        let source = WeiyunFolderSource {
            session: &session,
            share,
            g_tk: &g_tk,
            dir_names: DashMap::new(),
            domain,
        };
        let walker = DirectoryWalker::new(self.ctx.max_directory_depth);

        // A deferred listing resumes straight into one folder.
        if let Some(dir_id) = share.extras().get_str(extras_keys::DIR_ID) {
            return walker.collect(&source, &dir_id).await;
        }

        let view = self.fetch_view(&session, share, &g_tk).await?;
        let mut files: Vec<FileDescriptor> = view["file_list"]
            .as_array()
            .map(|list| {
                list.iter()
                    .map(|file| source.file_descriptor(file, ""))
                    .collect()
            })
            .unwrap_or_default();
        let dirs: Vec<FolderRef> = view["dir_list"]
            .as_array()
            .map(|list| list.iter().filter_map(folder_ref).collect())
            .unwrap_or_default();
        if files.is_empty() && dirs.is_empty() {
            return Err(ResolveError::EmptyShare {
                context: share.base_msg(),
                share_key: share.share_key().to_string(),
            });
        }
        for dir in &dirs {
            source
                .dir_names
                .insert(dir.folder_id.clone(), dir.folder_name.clone());
        }
        let branches = dirs
            .iter()
            .map(|dir| walker.collect(&source, &dir.folder_id));
        for branch in futures_util::future::try_join_all(branches).await? {
            files.extend(branch);
        }
        Ok(files)
    }

    async fn resolve_deferred(&self, share: &ShareDescriptor) -> Result<Resolved, ResolveError> {
        let context = share.base_msg();
        let packed = share
            .extras()
            .get_str(extras_keys::PARAM_JSON)
            .ok_or_else(|| ResolveError::provider(&context, "missing deferred parameters"))?;
        let param: Value = URL_SAFE
            .decode(&packed)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .or_else(|| serde_json::from_str(&packed).ok())
            .ok_or_else(|| ResolveError::provider(&context, "malformed deferred parameters"))?;
        let entry = DownloadEntry {
            file_id: param["file_id"].as_str().unwrap_or_default().to_string(),
            filename: param["filename"].as_str().unwrap_or_default().to_string(),
            file_size: param["file_size"].as_u64().unwrap_or(0),
            pdir_key: param["pdir_key"].as_str().unwrap_or_default().to_string(),
        };
        if entry.file_id.is_empty() {
            return Err(ResolveError::provider(
                &context,
                "deferred parameters missing file_id",
            ));
        }
        let share_key = param["share_key"]
            .as_str()
            .unwrap_or(share.share_key())
            .to_string();
        let share_pwd = param["share_pwd"].as_str().unwrap_or(share.password());

        let session = self.open_session(share)?;
        let g_tk = session.harvest_token(&share_key).await?;
        self.fetch_download(&session, &g_tk, &share_key, share_pwd, &entry)
            .await
    }
}

/// One resolution's session: transport plus the harvested token context.
struct WeiyunSession {
    transport: Transport,
    base: String,
    referer: String,
    cookie: Option<String>,
    context: String,
}

impl WeiyunSession {
    fn headers<'a>(&'a self) -> Vec<(&'a str, &'a str)> {
        let mut headers = vec![
            ("Accept", "application/json, text/plain, */*"),
            ("Origin", self.base.as_str()),
            ("Referer", self.referer.as_str()),
        ];
        if let Some(cookie) = &self.cookie {
            headers.push(("Cookie", cookie.as_str()));
        }
        headers
    }

    /// Obtains the `wyctoken`: from the caller cookie when present, else by
    /// hitting the share page and reading `Set-Cookie`. The transport jar
    /// keeps the cookie for the follow-up API calls; the returned value
    /// doubles as the `g_tk` query parameter.
    async fn harvest_token(&self, share_key: &str) -> Result<String, ResolveError> {
        if let Some(cookie) = &self.cookie
            && let Some(caps) = WYCTOKEN_RE.captures(cookie)
        {
            return Ok(caps[1].to_string());
        }
        let page_url = format!("{}/{share_key}", self.base);
        let response = self
            .transport
            .get_no_redirect(&page_url, &self.headers())
            .await
            .map_err(|e| wire_error(&self.context, e))?;
        for cookie in response.set_cookies() {
            if let Some(caps) = WYCTOKEN_RE.captures(&cookie) {
                info!(provider = "weiyun", "harvested wyctoken from share page");
                return Ok(caps[1].to_string());
            }
        }
        Err(ResolveError::provider(
            &self.context,
            "share page set no wyctoken cookie",
        ))
    }

    /// POSTs one enveloped request and unwraps the enveloped response.
    async fn post_envelope(
        &self,
        path: &str,
        g_tk: &str,
        cmd: i64,
        body_key: &str,
        body: Value,
        device_info: bool,
    ) -> Result<Value, ResolveError> {
        let r: f64 = rand::thread_rng().r#gen();
        let url = format!("{}{path}?refer=chrome_mac&g_tk={g_tk}&r={r}", self.base);
        let envelope = build_envelope(cmd, body_key, body, device_info);
        let response = self
            .transport
            .post_json(&url, &self.headers(), &envelope)
            .await
            .map_err(|e| wire_error(&self.context, e))?;
        let text =
            as_text(&response.body).map_err(|e| ResolveError::body_decode(&self.context, e))?;
        let reply: Value = serde_json::from_str(&text)
            .map_err(|e| ResolveError::body_decode(&self.context, e))?;
        unwrap_envelope(&self.context, &reply)
    }
}

/// The four fields the batch download endpoint needs per file.
#[derive(Debug, Clone)]
struct DownloadEntry {
    file_id: String,
    filename: String,
    file_size: u64,
    pdir_key: String,
}

impl DownloadEntry {
    fn from_listing(file: &Value, default_pdir: &str) -> Self {
        Self {
            file_id: file["file_id"].as_str().unwrap_or_default().to_string(),
            filename: file["filename"]
                .as_str()
                .or_else(|| file["file_name"].as_str())
                .unwrap_or_default()
                .to_string(),
            file_size: file["file_size"].as_u64().unwrap_or(0),
            pdir_key: file["pdir_key"]
                .as_str()
                .unwrap_or(default_pdir)
                .to_string(),
        }
    }
}

/// Listing source over the dir-list endpoint; folder names ride in a side
/// map because the endpoint wants both key and name.
struct WeiyunFolderSource<'a> {
    session: &'a WeiyunSession,
    share: &'a ShareDescriptor,
    g_tk: &'a str,
    dir_names: DashMap<String, String>,
    domain: String,
}

impl WeiyunFolderSource<'_> {
    fn file_descriptor(&self, file: &Value, default_pdir: &str) -> FileDescriptor {
        let entry = DownloadEntry::from_listing(file, default_pdir);
        let mut descriptor =
            FileDescriptor::file(&entry.file_id, &entry.filename, entry.file_size);
        let param = json!({
            "file_id": entry.file_id,
            "filename": entry.filename,
            "file_size": entry.file_size,
            "pdir_key": entry.pdir_key,
            "share_key": self.share.share_key(),
            "share_pwd": self.share.password(),
        });
        let packed = URL_SAFE.encode(param.to_string());
        descriptor.parser_url = Some(format!("{}/v2/redirectUrl/weiyun/{packed}", self.domain));
        descriptor
            .ext_parameters
            .insert("paramJson".to_string(), json!(packed));
        for (key, value) in [
            ("file_id", json!(entry.file_id)),
            ("pdir_key", json!(entry.pdir_key)),
        ] {
            descriptor.ext_parameters.insert(key.to_string(), value);
        }
        descriptor
    }
}

#[async_trait]
impl FolderSource for WeiyunFolderSource<'_> {
    async fn fetch_folder(&self, folder_id: &str) -> Result<FolderPage, ResolveError> {
        let dir_name = self
            .dir_names
            .get(folder_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let mut page = FolderPage::default();
        let mut start = 0;
        loop {
            let body = json!({
                "share_key": self.share.share_key(),
                "share_pwd": self.share.password(),
                "dir_key": folder_id,
                "dir_name": dir_name,
                "get_type": 0,
                "start": start,
                "count": DIR_PAGE_COUNT,
                "get_abstract_url": true,
            });
            let rsp = self
                .session
                .post_envelope(
                    DIR_LIST_PATH,
                    self.g_tk,
                    DIR_LIST_CMD,
                    ".weiyun.WeiyunShareDirListMsgReq_body",
                    body,
                    true,
                )
                .await?;
            let files = rsp["file_list"].as_array().cloned().unwrap_or_default();
            for file in &files {
                page.files.push(self.file_descriptor(file, folder_id));
            }
            if let Some(dirs) = rsp["dir_list"].as_array() {
                for dir in dirs.iter().filter_map(folder_ref) {
                    self.dir_names
                        .insert(dir.folder_id.clone(), dir.folder_name.clone());
                    page.folders.push(dir);
                }
            }
            if files.len() < DIR_PAGE_COUNT {
                break;
            }
            start += DIR_PAGE_COUNT;
        }
        Ok(page)
    }

    fn context(&self) -> String {
        self.session.context.clone()
    }
}

fn folder_ref(dir: &Value) -> Option<FolderRef> {
    let folder_id = dir["dir_key"].as_str()?.to_string();
    Some(FolderRef {
        folder_name: dir["dir_name"].as_str().unwrap_or_default().to_string(),
        folder_id,
    })
}

/// Builds the double-wrapped request envelope; header and body are JSON
/// encoded as strings inside the outer object, as the web client sends them.
fn build_envelope(cmd: i64, body_key: &str, body: Value, device_info: bool) -> Value {
    let mut req_header = json!({
        "seq": chrono::Utc::now().timestamp(),
        "type": 1,
        "cmd": cmd,
        "appid": 30113,
        "version": 3,
        "major_version": 3,
        "minor_version": 3,
        "fix_version": 3,
        "wx_openid": "",
        "qq_openid": "",
        "user_flag": 0,
        "env_id": "",
    });
    if device_info
        && let Some(header) = req_header.as_object_mut()
    {
        header.insert(
            "device_info".to_string(),
            json!("{\"browser\":\"chrome\"}"),
        );
    }
    let mut msg_body = Map::new();
    msg_body.insert(
        "ext_req_head".to_string(),
        json!({
            "token_info": { "token_type": 3, "login_key_type": 1540 },
            "language_info": { "language_type": 2052 },
        }),
    );
    msg_body.insert(body_key.to_string(), body);
    json!({
        "req_header": req_header.to_string(),
        "req_body": json!({ "ReqMsg_body": Value::Object(msg_body) }).to_string(),
    })
}

fn unwrap_envelope(context: &str, reply: &Value) -> Result<Value, ResolveError> {
    let Some(data) = reply.get("data") else {
        return Err(ResolveError::provider(context, "envelope missing data"));
    };
    let retcode = data["rsp_header"]["retcode"].as_i64();
    if retcode != Some(0) {
        let retmsg = data["rsp_header"]["retmsg"].as_str().unwrap_or("?");
        return Err(ResolveError::provider(
            context,
            format!("retcode {}: {retmsg}", retcode.unwrap_or(-1)),
        ));
    }
    Ok(data["rsp_body"]["RspMsg_body"].clone())
}

/// Headers the caller must replay verbatim on the final download request.
fn replay_headers(file_sha: Option<&str>, user_agent: &str, base: &str) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    // file_sha arrives off the wire; only a trailing ASCII-hex run is usable
    // as the cookie, anything else (short, non-hex, multibyte) is skipped.
    let sha_tail = file_sha
        .filter(|sha| sha.len() >= 8)
        .and_then(|sha| sha.get(sha.len() - 8..))
        .filter(|tail| tail.bytes().all(|b| b.is_ascii_hexdigit()));
    if let Some(tail) = sha_tail {
        headers.push(("Cookie".to_string(), format!("FTN5K={tail}")));
    }
    headers.push(("User-Agent".to_string(), user_agent.to_string()));
    headers.push(("Referer".to_string(), format!("{base}/")));
    headers
}
