use crate::api_client::{ApiClient, DEFAULT_SEARCH_LIMIT};
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Bulk-extraction settings shared by `extract-all` and `extract`.
pub struct ExtractOptions<'a> {
    pub output_dir: &'a Path,
    /// When set, ids already in the file are skipped and every processed id
    /// is appended to it.
    pub cache_file: Option<&'a Path>,
    /// When set, the search response is read from this file instead of
    /// calling the search endpoint.
    pub search_file: Option<&'a Path>,
    /// When set, only items whose stow URL contains this substring are
    /// extracted.
    pub stow_url_filter: Option<&'a str>,
}

/// Walks the search results and writes three files per harvested item:
/// `<stem>_v1.json` and `<stem>_v2.json` with both metadata
/// representations, and `<stem>_index.json` with the raw search hit.
pub fn run(client: &ApiClient, opts: &ExtractOptions) -> Result<()> {
    let search_response = match opts.search_file {
        Some(path) => {
            println!("Not calling search, using {}", path.display());
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read search file '{}'", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("search file '{}' is not valid JSON", path.display()))?
        }
        None => {
            println!("Calling search");
            client.search(DEFAULT_SEARCH_LIMIT)?
        }
    };

    let results = search_response
        .get("results")
        .and_then(Value::as_array)
        .context("search response has no 'results' array")?;
    println!("Retrieved {} results.", results.len());

    let mut cache = match opts.cache_file {
        Some(path) => Cache::load(path)?,
        None => Cache::default(),
    };

    fs::create_dir_all(opts.output_dir).with_context(|| {
        format!(
            "failed to create output directory '{}'",
            opts.output_dir.display()
        )
    })?;

    for entry in results {
        let result = entry
            .get("result")
            .context("search hit is missing its 'result' document")?;
        let stow_url = result
            .get("stow_url")
            .and_then(Value::as_str)
            .context("search result is missing 'stow_url'")?;
        let item_id = result
            .get("_id")
            .and_then(Value::as_str)
            .context("search result is missing '_id'")?;

        if let Some(filter) = opts.stow_url_filter {
            if !stow_url.contains(filter) {
                continue;
            }
        }
        if cache.contains(item_id) {
            println!("Already processed {item_id}, not extracting again.");
            continue;
        }
        // A result without a name has not been harvested, so there is no
        // metadata to fetch yet.
        if result.get("name").is_none() {
            println!("{item_id} not harvested yet.");
            continue;
        }

        let started = Instant::now();
        let layout = OutputLayout::for_stow_url(stow_url)?;
        let target_dir = opts.output_dir.join(&layout.subdir);
        fs::create_dir_all(&target_dir)
            .with_context(|| format!("failed to create '{}'", target_dir.display()))?;

        let v1 = client.get_item(item_id)?;
        let v2 = client.get_item_v2(item_id)?;

        write_json(&target_dir.join(layout.file_name("_v1.json")), &v1)?;
        write_json(&target_dir.join(layout.file_name("_v2.json")), &v2)?;
        write_json(&target_dir.join(layout.file_name("_index.json")), result)?;

        if let Some(path) = opts.cache_file {
            cache.record(path, item_id)?;
        }
        println!("Processed {item_id} in {}s.", started.elapsed().as_secs());
    }

    println!("Extract complete.");
    Ok(())
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("failed to write '{}'", path.display()))
}

/// Where an item's files land under the output directory: the final stow
/// URL segment names the files, the two segments before it name the
/// subdirectory.
struct OutputLayout {
    subdir: PathBuf,
    stem: String,
}

impl OutputLayout {
    fn for_stow_url(stow_url: &str) -> Result<Self> {
        let segments: Vec<&str> = stow_url
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        if segments.len() < 3 {
            bail!("stow URL '{stow_url}' has too few path segments");
        }
        let n = segments.len();
        Ok(Self {
            subdir: PathBuf::from(segments[n - 3]).join(segments[n - 2]),
            stem: segments[n - 1].to_string(),
        })
    }

    fn file_name(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.stem)
    }
}

/// The set of item ids already extracted, persisted as a JSON array.
#[derive(Default)]
struct Cache {
    ids: Vec<String>,
    seen: HashSet<String>,
}

impl Cache {
    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read cache file '{}'", path.display()))?;
        let ids: Vec<String> = serde_json::from_str(&raw).with_context(|| {
            format!(
                "cache file '{}' is not a JSON array of item ids",
                path.display()
            )
        })?;
        let seen = ids.iter().cloned().collect();
        Ok(Self { ids, seen })
    }

    fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Rewrites the whole file after every item so an interrupted run keeps
    /// the ids it already finished.
    fn record(&mut self, path: &Path, id: &str) -> Result<()> {
        self.ids.push(id.to_string());
        self.seen.insert(id.to_string());
        fs::write(path, serde_json::to_string_pretty(&self.ids)?)
            .with_context(|| format!("failed to update cache file '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn search_body() -> Value {
        json!({ "results": [
            { "result": { "_id": "item-1", "stow_url": "s3://bucket/jobs/42/a.mp4", "name": "a.mp4" } },
            { "result": { "_id": "item-2", "stow_url": "s3://bucket/jobs/42/b.mp4", "name": "b.mp4" } },
            { "result": { "_id": "item-3", "stow_url": "s3://bucket/jobs/43/c.mp4" } },
        ] })
    }

    fn mock_item<'a>(server: &'a MockServer, id: &str) -> (httpmock::Mock<'a>, httpmock::Mock<'a>) {
        let v1 = server.mock(|when, then| {
            when.method(GET).path(format!("/api/data/items/{id}"));
            then.status(200).json_body(json!({ "_id": id }));
        });
        let v2 = server.mock(|when, then| {
            when.method(GET).path(format!("/files/{id}/metadata2.json"));
            then.status(200).json_body(json!({ "media": {} }));
        });
        (v1, v2)
    }

    #[test]
    fn writes_three_files_per_item_and_skips_cached_and_unharvested() {
        let server = MockServer::start();
        let dir = tempdir().unwrap();
        let cache_path = dir.path().join("cache.json");
        fs::write(&cache_path, r#"["item-1"]"#).unwrap();

        let search = server.mock(|when, then| {
            when.method(POST).path("/api/data/search");
            then.status(200).json_body(search_body());
        });
        let (cached_v1, _) = mock_item(&server, "item-1");
        let (v1, v2) = mock_item(&server, "item-2");
        let (unharvested_v1, _) = mock_item(&server, "item-3");

        let client = ApiClient::new(&server.base_url(), "k").unwrap();
        let out = dir.path().join("out");
        run(
            &client,
            &ExtractOptions {
                output_dir: &out,
                cache_file: Some(&cache_path),
                search_file: None,
                stow_url_filter: None,
            },
        )
        .unwrap();

        search.assert();
        v1.assert();
        v2.assert();
        assert_eq!(cached_v1.hits(), 0);
        assert_eq!(unharvested_v1.hits(), 0);

        let item_dir = out.join("jobs").join("42");
        assert!(item_dir.join("b.mp4_v1.json").exists());
        assert!(item_dir.join("b.mp4_v2.json").exists());
        assert!(item_dir.join("b.mp4_index.json").exists());
        assert!(!out.join("jobs").join("43").exists());

        let cache: Vec<String> =
            serde_json::from_str(&fs::read_to_string(&cache_path).unwrap()).unwrap();
        assert_eq!(cache, vec!["item-1", "item-2"]);
    }

    #[test]
    fn filter_limits_extraction_to_matching_stow_urls() {
        let server = MockServer::start();
        let dir = tempdir().unwrap();

        server.mock(|when, then| {
            when.method(POST).path("/api/data/search");
            then.status(200).json_body(json!({ "results": [
                { "result": { "_id": "item-1", "stow_url": "s3://bucket/jobs/42/a.mp4", "name": "a.mp4" } },
                { "result": { "_id": "item-2", "stow_url": "s3://bucket/jobs/43/b.mp4", "name": "b.mp4" } },
            ] }));
        });
        let (matching_v1, _) = mock_item(&server, "item-1");
        let (other_v1, _) = mock_item(&server, "item-2");

        let client = ApiClient::new(&server.base_url(), "k").unwrap();
        run(
            &client,
            &ExtractOptions {
                output_dir: dir.path(),
                cache_file: None,
                search_file: None,
                stow_url_filter: Some("jobs/42"),
            },
        )
        .unwrap();

        matching_v1.assert();
        assert_eq!(other_v1.hits(), 0);
    }

    #[test]
    fn search_file_avoids_the_search_endpoint() {
        let server = MockServer::start();
        let dir = tempdir().unwrap();
        let search_path = dir.path().join("search.json");
        fs::write(&search_path, search_body().to_string()).unwrap();

        let search = server.mock(|when, then| {
            when.method(POST).path("/api/data/search");
            then.status(200).json_body(json!({ "results": [] }));
        });
        let (v1, _) = mock_item(&server, "item-1");
        mock_item(&server, "item-2");
        mock_item(&server, "item-3");

        let client = ApiClient::new(&server.base_url(), "k").unwrap();
        run(
            &client,
            &ExtractOptions {
                output_dir: &dir.path().join("out"),
                cache_file: None,
                search_file: Some(&search_path),
                stow_url_filter: None,
            },
        )
        .unwrap();

        assert_eq!(search.hits(), 0);
        v1.assert();
    }

    #[test]
    fn output_layout_uses_the_last_three_segments() {
        let layout = OutputLayout::for_stow_url("s3://bucket/jobs/42/a.mp4").unwrap();
        assert_eq!(layout.subdir, PathBuf::from("jobs").join("42"));
        assert_eq!(layout.stem, "a.mp4");
        assert_eq!(layout.file_name("_v1.json"), "a.mp4_v1.json");

        assert!(OutputLayout::for_stow_url("a.mp4").is_err());
    }

    #[test]
    fn cache_round_trips_and_persists_each_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = Cache::load(&path).unwrap();
        assert!(!cache.contains("item-1"));
        cache.record(&path, "item-1").unwrap();
        cache.record(&path, "item-2").unwrap();

        let reloaded = Cache::load(&path).unwrap();
        assert!(reloaded.contains("item-1"));
        assert!(reloaded.contains("item-2"));
        assert!(!reloaded.contains("item-3"));
    }
}
