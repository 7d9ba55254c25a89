use anyhow::{bail, Context, Result};
use reqwest::{
    blocking::{multipart, Client, Response},
    header,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

pub const DEFAULT_SEARCH_LIMIT: u64 = 50_000;
pub const DEFAULT_RANGE_SEARCH_LIMIT: u64 = 1_000;

/// Blocking client for the Metagrid REST API. Holds the base URL and a
/// bearer token baked into the default headers; every endpoint method is a
/// thin wrapper that builds a relative path and returns the parsed JSON
/// body.
#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

/// Response of the item-id endpoint.
#[derive(Serialize, Deserialize, Debug)]
pub struct ItemIdResponse {
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stow_url: Option<String>,
}

/// A storage key resolved to its platform coordinates.
#[derive(Debug)]
pub struct ResolvedItem {
    pub location_id: String,
    pub container_id: String,
    pub item_path: String,
    pub item_id: String,
    pub stow_url: Option<String>,
}

#[derive(Deserialize, Debug)]
struct LocationsResponse {
    locations: Vec<LocationEntry>,
}

#[derive(Deserialize, Debug)]
struct LocationEntry {
    id: String,
}

#[derive(Deserialize, Debug)]
struct ContainerEntry {
    id: String,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let mut auth_value = header::HeaderValue::from_str(&format!("Bearer {api_key}"))
            .context("API key contains characters not allowed in a header")?;
        auth_value.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth_value);

        Ok(Self {
            client: Client::builder().default_headers(headers).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {url}");
        let response = self.client.get(&url).send()?;
        Self::decode("GET", path, response)
    }

    pub fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("POST {url} body={body}");
        let response = self.client.post(&url).json(body).send()?;
        Self::decode("POST", path, response)
    }

    pub fn delete(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("DELETE {url}");
        let response = self.client.delete(&url).send()?;
        Self::decode("DELETE", path, response)
    }

    fn decode(method: &str, path: &str, response: Response) -> Result<Value> {
        let status = response.status();
        let text = response.text().unwrap_or_default();
        if !status.is_success() {
            bail!("{method} {path} failed: {status} - {text}");
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .with_context(|| format!("{method} {path} returned a non-JSON body"))
    }

    // Locations and containers

    pub fn list_locations(&self) -> Result<Value> {
        self.get("/api/data/locations")
    }

    pub fn get_location(&self, location_id: &str) -> Result<Value> {
        self.get(&format!("/api/data/locations/{location_id}"))
    }

    pub fn list_containers(&self, location_id: &str) -> Result<Value> {
        self.get(&format!("/api/data/locations/{location_id}/containers"))
    }

    pub fn list_enabled_containers(&self) -> Result<Value> {
        self.get("/api/data/containers/enabled")
    }

    // Items

    pub fn get_item(&self, item_id: &str) -> Result<Value> {
        self.get(&format!("/api/data/items/{item_id}"))
    }

    pub fn get_item_v2(&self, item_id: &str) -> Result<Value> {
        self.get(&format!("/files/{item_id}/metadata2.json"))
    }

    pub fn delete_item(&self, item_id: &str) -> Result<Value> {
        self.delete(&format!("/api/data/items/{item_id}"))
    }

    /// Asks the server which item id is assigned to a path within a
    /// container. A non-2xx status means no id has been assigned yet, which
    /// is an expected outcome rather than a failure.
    pub fn item_id_for(
        &self,
        location_id: &str,
        container_id: &str,
        item_path: &str,
    ) -> Result<Option<ItemIdResponse>> {
        let url = format!("{}/api/control/item-id", self.base_url);
        let body = json!({
            "location_id": location_id,
            "container_id": container_id,
            "item_id": item_path,
        });
        log::debug!("POST {url} body={body}");
        let response = self.client.post(&url).json(&body).send()?;
        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(Some(response.json()?))
    }

    // Harvest

    pub fn harvest_item(
        &self,
        location_id: &str,
        container_id: &str,
        stow_url: &str,
        force: bool,
    ) -> Result<Value> {
        self.post(
            "/api/control/harvest",
            &json!({
                "location_id": location_id,
                "container_id": container_id,
                "item_stow_url": stow_url,
                "force": force,
            }),
        )
    }

    pub fn harvest_container(
        &self,
        location_id: &str,
        container_id: &str,
        force: bool,
    ) -> Result<Value> {
        self.post(
            "/api/control/harvest",
            &json!({
                "location_id": location_id,
                "container_id": container_id,
                "force": force,
            }),
        )
    }

    // Keywords

    pub fn keyword_groups(&self) -> Result<Value> {
        self.get("/api/data/keywords")
    }

    pub fn keyword_group(&self, group_id: &str) -> Result<Value> {
        self.get(&format!("/api/data/keyword-groups/{group_id}"))
    }

    pub fn create_keyword_group(&self, name: &str, color: &str) -> Result<Value> {
        self.post(
            "/api/data/keyword-groups",
            &json!({ "name": name, "color": color }),
        )
    }

    pub fn delete_keyword_group(&self, group_id: &str) -> Result<Value> {
        self.delete(&format!("/api/data/keyword-groups/{group_id}"))
    }

    pub fn add_keyword(&self, group_id: &str, word: &str) -> Result<Value> {
        self.post(
            &format!("/api/data/keywords/{group_id}"),
            &json!({ "word": word }),
        )
    }

    pub fn remove_keyword(&self, group_id: &str, word: &str) -> Result<Value> {
        self.delete(&format!("/api/data/keywords/{group_id}?word={word}"))
    }

    // Comments

    pub fn add_comment(&self, item_id: &str, body: &str) -> Result<Value> {
        self.post(
            "/api/data/comments",
            &json!({
                "target_type": "item",
                "target_id": item_id,
                "body": body,
            }),
        )
    }

    pub fn list_comments(&self, item_id: &str) -> Result<Value> {
        self.get(&format!(
            "/api/data/comments?target_type=item&page=0&target_id={item_id}"
        ))
    }

    pub fn delete_comment(&self, comment_id: &str) -> Result<Value> {
        self.delete(&format!("/api/data/comments/{comment_id}"))
    }

    // Captions

    pub fn get_captions(&self, item_id: &str) -> Result<Value> {
        self.get(&format!("/api/data/items/{item_id}?only=captions.captions"))
    }

    pub fn upload_captions(&self, item_id: &str, file: &Path) -> Result<Value> {
        let path = format!("/api/data/items/{item_id}/captions");
        let url = format!("{}{}", self.base_url, path);
        log::debug!("POST {url} multipart caption_file={}", file.display());
        let form = multipart::Form::new()
            .file("caption_file", file)
            .with_context(|| format!("failed to open caption file '{}'", file.display()))?;
        let response = self.client.post(&url).multipart(form).send()?;
        Self::decode("POST", &path, response)
    }

    pub fn delete_captions(&self, item_id: &str, caption_id: &str) -> Result<Value> {
        self.delete(&format!(
            "/api/data/items/{item_id}/captions?caption_id={caption_id}"
        ))
    }

    // Search

    pub fn search(&self, limit: u64) -> Result<Value> {
        self.post("/api/data/search", &json!({ "limit": limit }))
    }

    pub fn search_extracted(&self, limit: u64) -> Result<Value> {
        self.post(
            "/api/data/search",
            &json!({
                "limit": limit,
                "filters": { "exists": [ { "field": "extracted", "value": true } ] },
            }),
        )
    }

    pub fn search_not_extracted(&self, limit: u64) -> Result<Value> {
        self.post(
            "/api/data/search",
            &json!({
                "limit": limit,
                "filters": { "not_exists": [ { "field": "extracted", "value": true } ] },
            }),
        )
    }

    pub fn search_last_modified(&self, from: &str, to: &str, limit: u64) -> Result<Value> {
        self.post(
            "/api/data/search",
            &json!({ "limit": limit, "last_modified": { "from": from, "to": to } }),
        )
    }

    pub fn search_last_harvested(&self, from: &str, to: &str, limit: u64) -> Result<Value> {
        self.post(
            "/api/data/search",
            &json!({ "limit": limit, "last_harvested": { "from": from, "to": to } }),
        )
    }

    pub fn scroll(&self) -> Result<Value> {
        self.post("/api/data/scroll", &json!({}))
    }

    // System

    pub fn health(&self) -> Result<Value> {
        self.get("/api/data/healthz")
    }

    pub fn stats(&self) -> Result<Value> {
        self.get("/api/control/system/stats")
    }

    pub fn activity(&self) -> Result<Value> {
        self.get("/api/data/activity")
    }

    pub fn user(&self) -> Result<Value> {
        self.get("/api/data/user")
    }

    pub fn platform_summary(&self) -> Result<Value> {
        self.get("/api/data/summary/platform")
    }

    pub fn data_summary(&self) -> Result<Value> {
        self.get("/api/data/summary/data")
    }

    pub fn compilations(&self) -> Result<Value> {
        self.get("/api/data/summary/compilations")
    }

    pub fn features(&self) -> Result<Value> {
        self.get("/api/data/features")
    }

    /// Resolves a `bucket/key` storage reference (an optional `s3://`
    /// prefix is stripped) to its item id by chaining three lookups: the
    /// first registered location, the enabled container whose id equals
    /// the bucket, and the item-id mapping for the key's final segment.
    pub fn resolve_storage_key(&self, storage_key: &str) -> Result<ResolvedItem> {
        let (bucket, item_path) = split_storage_key(storage_key)?;

        let locations: LocationsResponse = serde_json::from_value(self.list_locations()?)
            .context("unexpected locations response shape")?;
        let location = locations
            .locations
            .first()
            .context("server has no registered locations")?;

        let containers: Vec<ContainerEntry> =
            serde_json::from_value(self.list_enabled_containers()?)
                .context("unexpected enabled-containers response shape")?;
        let container = containers
            .iter()
            .find(|container| container.id == bucket)
            .with_context(|| format!("no enabled container matching '{bucket}'"))?;

        let item = self
            .item_id_for(&location.id, &container.id, &item_path)?
            .with_context(|| format!("no item id assigned for '{item_path}' in '{bucket}'"))?;

        Ok(ResolvedItem {
            location_id: location.id.clone(),
            container_id: container.id.clone(),
            item_path,
            item_id: item.item_id,
            stow_url: item.stow_url,
        })
    }
}

/// Splits a storage key into its bucket and the final path segment naming
/// the item.
pub fn split_storage_key(storage_key: &str) -> Result<(String, String)> {
    let key = storage_key.strip_prefix("s3://").unwrap_or(storage_key);
    let (bucket, rest) = key
        .split_once('/')
        .with_context(|| format!("storage key '{storage_key}' is not in bucket/key form"))?;
    let item_path = rest.rsplit('/').next().unwrap_or(rest);
    if bucket.is_empty() || item_path.is_empty() {
        bail!("storage key '{storage_key}' is not in bucket/key form");
    }
    Ok((bucket.to_string(), item_path.to_string()))
}
