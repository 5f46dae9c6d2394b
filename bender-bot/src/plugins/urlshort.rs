//! Link shortener.
//!
//! Every web address in a message that is at least `minlen` characters long
//! is sent to a shortening service, after stripping known tracking
//! parameters from its query string.
//!
//! ```toml
//! [config]
//! apikey = "..."
//! service = "tinyurl"          # bitly, tinyurl, cleanuri (default), isgd, shortio
//! custom_domain = "bndr.example"  # required for shortio
//! minlen = 40
//! cleanup = true
//! tracking_file = "conf/plugins/tracking.json"
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::urls::find_urls;
use super::{EventContext, Export, Plugin, Reply};

const DEFAULT_TRACKING_FILE: &str = "plugins/urlshort/tracking.json";

const BITLY_API_URL: &str = "https://api-ssl.bitly.com/v4/shorten";
const TINYURL_API_URL: &str = "https://api.tinyurl.com/create";
const CLEANURI_API_URL: &str = "https://cleanuri.com/api/v1/shorten";
const ISGD_API_URL: &str = "https://is.gd/create.php";
const SHORTIO_API_URL: &str = "https://api.short.io/links/public";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Bitly,
    TinyUrl,
    CleanUri,
    IsGd,
    ShortIo,
}

impl FromStr for Service {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bitly" | "bit.ly" => Ok(Service::Bitly),
            "tinyurl" | "tinyurl.com" => Ok(Service::TinyUrl),
            "clean" | "cleanuri" => Ok(Service::CleanUri),
            "isgd" | "is.gd" => Ok(Service::IsGd),
            "shortio" | "short.io" => Ok(Service::ShortIo),
            other => bail!("unknown service {other:?}"),
        }
    }
}

impl Service {
    fn authorization(self, token: &str) -> String {
        match self {
            Service::ShortIo => token.to_string(),
            _ => format!("Bearer {token}"),
        }
    }
}

#[derive(Debug)]
struct Settings {
    apikey: String,
    custom_domain: Option<String>,
    minlen: usize,
    service: Service,
    cleanup: bool,
    tracking: HashSet<String>,
}

#[derive(Default)]
pub struct UrlShortPlugin {
    inner: Arc<Shortener>,
}

#[derive(Default)]
struct Shortener {
    settings: RwLock<Option<Arc<Settings>>>,
    http: reqwest::Client,
}

impl Plugin for UrlShortPlugin {
    fn lookup(&self, symbol: &str) -> Option<Export> {
        match symbol {
            "UrlShort" => {
                let inner = self.inner.clone();
                Some(Export::matcher(move |message: &str, _ctx: &EventContext| {
                    inner.shorten_all(message)
                }))
            }
            _ => None,
        }
    }

    fn matchers(&self) -> Option<Vec<String>> {
        Some(vec!["UrlShort".to_string()])
    }

    fn configurable(&self) -> bool {
        true
    }

    fn configure(&self, config: &toml::Table) -> anyhow::Result<()> {
        let settings = parse_settings(config)?;
        tracing::info!(service = ?settings.service, minlen = settings.minlen, "URL shortener configured");
        *self.inner.settings.write() = Some(Arc::new(settings));
        Ok(())
    }
}

fn parse_settings(config: &toml::Table) -> anyhow::Result<Settings> {
    let custom_domain = match config.get("custom_domain") {
        Some(value) => Some(value.as_str().context("invalid custom_domain format")?.to_string()),
        None => None,
    };
    let apikey = config
        .get("apikey")
        .context("no apikey found")?
        .as_str()
        .context("invalid apikey format")?
        .to_string();
    let minlen = match config.get("minlen") {
        Some(value) => {
            let n = value.as_integer().context("invalid minlen format")?;
            usize::try_from(n).context("invalid minlen format")?
        }
        None => 0,
    };
    let service = match config.get("service") {
        Some(value) => value.as_str().context("invalid service format")?.parse()?,
        None => Service::CleanUri,
    };
    if service == Service::ShortIo && custom_domain.is_none() {
        bail!("custom domain undefined");
    }
    let cleanup = match config.get("cleanup") {
        Some(value) => value.as_bool().context("invalid cleanup format")?,
        None => true,
    };
    let tracking = if cleanup {
        let file = match config.get("tracking_file") {
            Some(value) => value.as_str().context("invalid tracking_file format")?,
            None => DEFAULT_TRACKING_FILE,
        };
        load_tracking_params(Path::new(file)).context("error loading cleanup parameters file")?
    } else {
        HashSet::new()
    };

    Ok(Settings {
        apikey,
        custom_domain,
        minlen,
        service,
        cleanup,
        tracking,
    })
}

#[derive(Deserialize)]
struct TrackingParam {
    #[serde(alias = "Name")]
    name: String,
}

fn load_tracking_params(path: &Path) -> anyhow::Result<HashSet<String>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let params: Vec<TrackingParam> = serde_json::from_str(&raw)?;
    Ok(params.into_iter().map(|p| p.name).collect())
}

/// Drop query parameters named in `tracking`.
pub fn clean_url(url: &str, tracking: &HashSet<String>) -> Result<String, url::ParseError> {
    let mut parsed = Url::parse(url)?;
    if parsed.query().is_none() {
        return Ok(parsed.into());
    }
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| {
            let tracked = tracking.contains(key.as_ref());
            if tracked {
                tracing::debug!(param = %key, "Removed tracking parameter from url");
            }
            !tracked
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    Ok(parsed.into())
}

#[derive(Debug, PartialEq)]
enum RequestBody {
    Json(Value),
    Form(Vec<(&'static str, String)>),
}

#[derive(Debug)]
struct ShortenRequest {
    endpoint: &'static str,
    body: RequestBody,
    /// Path to the short link in the response JSON.
    result_path: &'static [&'static str],
}

fn build_request(service: Service, long_url: &str, custom_domain: Option<&str>) -> anyhow::Result<ShortenRequest> {
    let request = match service {
        Service::Bitly => ShortenRequest {
            endpoint: BITLY_API_URL,
            body: RequestBody::Json(json!({
                "domain": custom_domain.unwrap_or("bit.ly"),
                "long_url": long_url,
            })),
            result_path: &["link"],
        },
        Service::TinyUrl => {
            let mut body = json!({ "url": long_url });
            if let Some(domain) = custom_domain {
                body["domain"] = json!(domain);
            }
            ShortenRequest {
                endpoint: TINYURL_API_URL,
                body: RequestBody::Json(body),
                result_path: &["data", "tiny_url"],
            }
        }
        Service::CleanUri => ShortenRequest {
            endpoint: CLEANURI_API_URL,
            body: RequestBody::Json(json!({ "url": long_url })),
            result_path: &["result_url"],
        },
        Service::IsGd => ShortenRequest {
            endpoint: ISGD_API_URL,
            body: RequestBody::Form(vec![("format", "json".to_string()), ("url", long_url.to_string())]),
            result_path: &["shorturl"],
        },
        Service::ShortIo => {
            let domain = custom_domain.ok_or_else(|| anyhow!("custom domain undefined"))?;
            ShortenRequest {
                endpoint: SHORTIO_API_URL,
                body: RequestBody::Json(json!({ "domain": domain, "originalURL": long_url })),
                result_path: &["shortURL"],
            }
        }
    };
    Ok(request)
}

fn extract_link(response: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(response, |value, key| value.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl Shortener {
    /// Matcher body. Runs on a blocking thread, so it can wait on the
    /// requests directly.
    fn shorten_all(&self, message: &str) -> Reply {
        let Some(settings) = self.settings.read().clone() else {
            return Reply::none();
        };
        let urls: Vec<&str> = find_urls(message)
            .into_iter()
            .filter(|url| url.contains("://") && url.len() >= settings.minlen)
            .collect();
        if urls.is_empty() {
            return Reply::none();
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("URL shortener called outside the runtime");
            return Reply::none();
        };

        let shorts: Vec<String> = urls
            .into_iter()
            .filter_map(|url| match runtime.block_on(self.shorten(&settings, url)) {
                Ok(link) => Some(link),
                Err(e) => {
                    tracing::info!(url, error = %e, "Error shortening url");
                    None
                }
            })
            .collect();
        Reply::say(shorts.join(" "))
    }

    async fn shorten(&self, settings: &Settings, url: &str) -> anyhow::Result<String> {
        let url = if settings.cleanup {
            clean_url(url, &settings.tracking).unwrap_or_else(|e| {
                tracing::error!(url, error = %e, "Error cleaning url");
                url.to_string()
            })
        } else {
            url.to_string()
        };
        let request = build_request(settings.service, &url, settings.custom_domain.as_deref())?;

        let mut builder = self.http.post(request.endpoint);
        if !settings.apikey.is_empty() {
            builder = builder.header(
                reqwest::header::AUTHORIZATION,
                settings.service.authorization(&settings.apikey),
            );
        }
        builder = match &request.body {
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Form(fields) => builder.form(fields),
        };
        tracing::debug!(endpoint = request.endpoint, body = ?request.body, "Shortening url");

        let resp = builder.send().await.context("request to shortening service failed")?;
        let status = resp.status();
        let body = resp.text().await.context("error reading shortening service reply")?;
        tracing::debug!(%status, body, "Shortening service reply");
        if !status.is_success() {
            bail!("got error reply from upstream: {status}, body {body:?}");
        }
        let reply: Value = serde_json::from_str(&body).context("shortening service reply is not JSON")?;
        extract_link(&reply, request.result_path).ok_or_else(|| anyhow!("no short link in reply"))
    }
}
