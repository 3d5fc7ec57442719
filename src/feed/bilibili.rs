//! HTTP feed client for the bilibili comment API
//!
//! Every endpoint answers with a `{code, message, data}` envelope; a non-zero
//! `code` is an API error even when the HTTP status is 200. The reply list
//! endpoint returns newest first, so items are reversed before they are handed
//! to the engine.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, trace, warn};

use crate::config::{ClientConfig, Credentials};
use crate::{ActorId, ActorMeta, ContainerCounts, ContainerMeta, FeedIdentity, Item, ItemId};

use super::{FeedClient, FeedError, FeedResult};

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.93 Safari/537.36";

/// Code the API uses for "not logged in"
const NOT_LOGGED_IN: i64 = -101;

/// Retries for the container counter request
const COUNT_RETRIES: usize = 2;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn check(&self) -> FeedResult<()> {
        match self.code {
            0 => Ok(()),
            NOT_LOGGED_IN => Err(FeedError::Unauthenticated(self.message.clone())),
            code => Err(FeedError::Api {
                code,
                message: self.message.clone(),
            }),
        }
    }

    fn into_data(self) -> FeedResult<T> {
        self.check()?;
        self.data
            .ok_or_else(|| FeedError::Decode("response has no data field".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct Account {
    uname: String,
}

#[derive(Debug, Deserialize)]
struct ReplyPage {
    #[serde(default)]
    replies: Option<Vec<Reply>>,
    #[serde(default)]
    cursor: Cursor,
}

#[derive(Debug, Default, Deserialize)]
struct Cursor {
    #[serde(default)]
    all_count: u64,
    #[serde(default)]
    prev: u64,
}

#[derive(Debug, Deserialize)]
struct Reply {
    rpid: u64,
    mid: u64,
    ctime: i64,
    content: ReplyContent,
    member: ReplyMember,
}

#[derive(Debug, Deserialize)]
struct ReplyContent {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ReplyMember {
    #[serde(default)]
    uname: String,
}

#[derive(Debug, Deserialize)]
struct DynamicDetail {
    item: DynamicItem,
}

#[derive(Debug, Deserialize)]
struct DynamicItem {
    basic: DynamicBasic,
    #[serde(default)]
    modules: Option<DynamicModules>,
}

#[derive(Debug, Deserialize)]
struct DynamicBasic {
    comment_id_str: String,
    comment_type: i32,
}

#[derive(Debug, Deserialize)]
struct DynamicModules {
    module_author: Option<DynamicAuthor>,
}

#[derive(Debug, Deserialize)]
struct DynamicAuthor {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpaceInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    face: String,
    #[serde(default)]
    sign: String,
}

#[derive(Debug, Deserialize)]
struct RelationStat {
    follower: u64,
}

/// Feed client backed by the bilibili web API
pub struct BiliClient {
    client: reqwest::Client,
    base_url: String,
    csrf: String,
}

impl BiliClient {
    /// Build a client authenticating with cookie credentials
    ///
    /// Credentials are not checked here; call [`FeedClient::whoami`] for that.
    pub fn new(config: &ClientConfig, credentials: &Credentials) -> FeedResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9"));

        let cookie = Self::cookie_header(credentials);
        if !cookie.is_empty() {
            let value = HeaderValue::from_str(&cookie).map_err(|_| {
                FeedError::Unauthenticated("credentials contain invalid characters".to_string())
            })?;
            headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            csrf: credentials.csrf.clone().unwrap_or_default(),
        })
    }

    fn cookie_header(credentials: &Credentials) -> String {
        let pairs = [
            ("DedeUserID", credentials.uid.map(|uid| uid.to_string())),
            ("DedeUserID__ckMd5", credentials.uid_md5.clone()),
            ("SESSDATA", credentials.sessdata.clone()),
            ("bili_jct", credentials.csrf.clone()),
            ("sid", credentials.sid.clone()),
        ];

        pairs
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| format!("{name}={v}")))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> FeedResult<T> {
        let response = self.client.get(self.url(path)).query(query).send().await?;

        if !response.status().is_success() {
            return Err(FeedError::Http(response.status().as_u16()));
        }

        let envelope: Envelope<T> = response.json().await?;
        envelope.into_data()
    }

    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        retries: usize,
    ) -> FeedResult<T> {
        let mut attempt = 0;
        loop {
            match self.get(path, query).await {
                Ok(data) => return Ok(data),
                Err(e) if attempt < retries => {
                    attempt += 1;
                    debug!("GET {path} failed ({e}), retry {attempt}/{retries}");
                    tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_form(&self, path: &str, form: &[(&str, String)]) -> FeedResult<()> {
        let response = self.client.post(self.url(path)).form(form).send().await?;

        if !response.status().is_success() {
            return Err(FeedError::Http(response.status().as_u16()));
        }

        let envelope: Envelope<serde_json::Value> = response.json().await?;
        envelope.check()
    }

    fn item_from_reply(feed: &FeedIdentity, reply: Reply) -> Item {
        Item {
            id: ItemId(reply.rpid),
            actor_id: ActorId(reply.mid),
            actor_name: reply.member.uname,
            emitted_at: reply.ctime,
            payload: reply.content.message,
            feed: *feed,
        }
    }

    async fn fetch_counts(&self, feed: &FeedIdentity) -> FeedResult<ContainerCounts> {
        let page: ReplyPage = self
            .get_with_retry(
                "/x/v2/reply/main",
                &[
                    ("oid", feed.container_id.to_string()),
                    ("type", feed.container_kind.to_string()),
                    ("mode", "2".to_string()),
                    ("ps", "1".to_string()),
                ],
                COUNT_RETRIES,
            )
            .await?;

        Ok(ContainerCounts {
            total: page.cursor.all_count,
            top_level: page.cursor.prev,
        })
    }
}

#[async_trait]
impl FeedClient for BiliClient {
    #[instrument(skip(self))]
    async fn whoami(&self) -> FeedResult<String> {
        let account: Account = self.get("/x/member/web/account", &[]).await?;
        debug!("authenticated as {}", account.uname);
        Ok(account.uname)
    }

    #[instrument(skip(self), fields(feed = %feed))]
    async fn fetch_items(&self, feed: &FeedIdentity) -> FeedResult<Vec<Item>> {
        let page: ReplyPage = self
            .get(
                "/x/v2/reply/main",
                &[
                    ("oid", feed.container_id.to_string()),
                    ("type", feed.container_kind.to_string()),
                    ("mode", "2".to_string()),
                ],
            )
            .await?;

        let mut items: Vec<Item> = page
            .replies
            .unwrap_or_default()
            .into_iter()
            .map(|reply| Self::item_from_reply(feed, reply))
            .collect();
        items.reverse();

        trace!("fetched {} items", items.len());
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn fetch_container_meta(&self, handle: u64) -> FeedResult<ContainerMeta> {
        let detail: DynamicDetail = self
            .get(
                "/x/polymer/web-dynamic/v1/detail",
                &[("timezone_offset", "0".to_string()), ("id", handle.to_string())],
            )
            .await?;

        let container_id = detail.item.basic.comment_id_str.parse::<u64>().map_err(|e| {
            FeedError::Decode(format!(
                "invalid comment id '{}': {e}",
                detail.item.basic.comment_id_str
            ))
        })?;
        let identity = FeedIdentity {
            container_id,
            container_kind: detail.item.basic.comment_type,
        };
        let name = detail
            .item
            .modules
            .and_then(|m| m.module_author)
            .map(|author| author.name)
            .unwrap_or_default();

        let counts = self.fetch_counts(&identity).await?;
        debug!(
            "resolved handle {handle} to {identity} (total {}, top-level {})",
            counts.total, counts.top_level
        );

        Ok(ContainerMeta {
            identity,
            name,
            counts,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_actor_meta(&self, actor: ActorId) -> FeedResult<ActorMeta> {
        let info: SpaceInfo = self
            .get("/x/space/acc/info", &[("mid", actor.to_string())])
            .await?;

        Ok(ActorMeta {
            name: info.name,
            avatar: info.face,
            bio: info.sign,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_actor_stat(&self, actor: ActorId) -> FeedResult<u64> {
        let stat: RelationStat = self
            .get("/x/relation/stat", &[("vmid", actor.to_string())])
            .await?;
        Ok(stat.follower)
    }

    #[instrument(skip(self, item), fields(item = %item.id))]
    async fn perform_action(&self, item: &Item) -> FeedResult<bool> {
        let result = self
            .post_form(
                "/x/v2/reply/action",
                &[
                    ("type", item.feed.container_kind.to_string()),
                    ("oid", item.feed.container_id.to_string()),
                    ("rpid", item.id.to_string()),
                    ("action", "1".to_string()),
                    ("csrf", self.csrf.clone()),
                    ("ordering", "time".to_string()),
                ],
            )
            .await;

        match result {
            Ok(()) => Ok(true),
            Err(FeedError::Api { code, message }) => {
                warn!("action declined ({code}): {message}");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, item, text), fields(item = %item.id))]
    async fn post_reply(&self, item: &Item, text: &str) -> FeedResult<()> {
        self.post_form(
            "/x/v2/reply/add",
            &[
                ("type", item.feed.container_kind.to_string()),
                ("oid", item.feed.container_id.to_string()),
                ("message", text.to_string()),
                ("plat", "1".to_string()),
                ("csrf", self.csrf.clone()),
                ("root", item.id.to_string()),
                ("parent", item.id.to_string()),
            ],
        )
        .await
    }
}
