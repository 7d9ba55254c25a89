use crate::api_client::{ApiClient, DEFAULT_RANGE_SEARCH_LIMIT, DEFAULT_SEARCH_LIMIT};
use crate::args::{
    CaptionsCommand, Command, CommentCommand, HarvestCommand, KeywordCommand, SearchArgs,
};
use crate::extract::{self, ExtractOptions};
use anyhow::{Context, Result};
use serde_json::Value;

/// Maps every subcommand onto the API client call it stands for and prints
/// the response.
pub struct Runner {
    client: ApiClient,
}

impl Runner {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Locations => self.print(self.client.list_locations()?),
            Command::Location { location_id } => {
                self.print(self.client.get_location(&location_id)?)
            }
            Command::Containers => self.print(self.client.list_enabled_containers()?),
            Command::AllContainers { location_id } => {
                self.print(self.client.list_containers(&location_id)?)
            }
            Command::Items => self.print(self.client.search(DEFAULT_SEARCH_LIMIT)?),
            Command::ItemIds => self.print_item_table(),
            Command::Item { item_id } => self.print(self.client.get_item(&item_id)?),
            Command::ItemV2 { item_id } => self.print(self.client.get_item_v2(&item_id)?),
            Command::DeleteItem { item_id } => self.print(self.client.delete_item(&item_id)?),
            Command::ItemId {
                location_id,
                container_id,
                item_path,
            } => {
                match self
                    .client
                    .item_id_for(&location_id, &container_id, &item_path)?
                {
                    Some(found) => println!("{}", serde_json::to_string_pretty(&found)?),
                    None => println!("No item id found."),
                }
                Ok(())
            }
            Command::Resolve { storage_key } => {
                let resolved = self.client.resolve_storage_key(&storage_key)?;
                println!("{}", resolved.item_id);
                Ok(())
            }
            Command::ItemFromKey { storage_key } => {
                let resolved = self.client.resolve_storage_key(&storage_key)?;
                self.print(self.client.get_item(&resolved.item_id)?)
            }
            Command::HarvestFromKey { storage_key, force } => {
                let resolved = self.client.resolve_storage_key(&storage_key)?;
                let stow_url = resolved
                    .stow_url
                    .context("server did not report a stow URL for the resolved item")?;
                self.print(self.client.harvest_item(
                    &resolved.location_id,
                    &resolved.container_id,
                    &stow_url,
                    force,
                )?)
            }
            Command::Harvest(harvest) => match harvest {
                HarvestCommand::Item {
                    location_id,
                    container_id,
                    stow_url,
                    force,
                } => self.print(self.client.harvest_item(
                    &location_id,
                    &container_id,
                    &stow_url,
                    force,
                )?),
                HarvestCommand::Container {
                    location_id,
                    container_id,
                    force,
                } => self.print(
                    self.client
                        .harvest_container(&location_id, &container_id, force)?,
                ),
            },
            Command::Keyword(keyword) => match keyword {
                KeywordCommand::List => self.print(self.client.keyword_groups()?),
                KeywordCommand::Get { group_id } => {
                    self.print(self.client.keyword_group(&group_id)?)
                }
                KeywordCommand::CreateGroup { name, color } => {
                    let color = format!("#{}", color.trim_start_matches('#'));
                    self.print(self.client.create_keyword_group(&name, &color)?)
                }
                KeywordCommand::DeleteGroup { group_id } => {
                    self.print(self.client.delete_keyword_group(&group_id)?)
                }
                KeywordCommand::Add { group_id, word } => {
                    self.print(self.client.add_keyword(&group_id, &word)?)
                }
                KeywordCommand::Remove { group_id, word } => {
                    self.print(self.client.remove_keyword(&group_id, &word)?)
                }
            },
            Command::Comment(comment) => match comment {
                CommentCommand::Add { item_id, body } => {
                    self.print(self.client.add_comment(&item_id, &body)?)
                }
                CommentCommand::List { item_id } => {
                    self.print(self.client.list_comments(&item_id)?)
                }
                CommentCommand::Delete { comment_id } => {
                    self.print(self.client.delete_comment(&comment_id)?)
                }
            },
            Command::Captions(captions) => match captions {
                CaptionsCommand::Get { item_id } => {
                    self.print(self.client.get_captions(&item_id)?)
                }
                CaptionsCommand::Upload { item_id, file } => {
                    self.print(self.client.upload_captions(&item_id, &file)?)
                }
                CaptionsCommand::Delete {
                    item_id,
                    caption_id,
                } => self.print(self.client.delete_captions(&item_id, &caption_id)?),
            },
            Command::Search(args) => self.print(self.search(&args)?),
            Command::Scroll => self.print(self.client.scroll()?),
            Command::ExtractAll(args) => extract::run(
                &self.client,
                &ExtractOptions {
                    output_dir: &args.output_dir,
                    cache_file: Some(&args.cache_file),
                    search_file: args.search_file.as_deref(),
                    stow_url_filter: None,
                },
            ),
            Command::Extract(args) => extract::run(
                &self.client,
                &ExtractOptions {
                    output_dir: &args.output_dir,
                    cache_file: None,
                    search_file: args.search_file.as_deref(),
                    stow_url_filter: Some(&args.query),
                },
            ),
            Command::Health => self.print(self.client.health()?),
            Command::Stats => self.print(self.client.stats()?),
            Command::Activity => self.print(self.client.activity()?),
            Command::User => self.print(self.client.user()?),
            Command::Platform => self.print(self.client.platform_summary()?),
            Command::Summary => self.print(self.client.data_summary()?),
            Command::Compilations => self.print(self.client.compilations()?),
            Command::Features => self.print(self.client.features()?),
            Command::Get { path } => self.print(self.client.get(&path)?),
        }
    }

    fn search(&self, args: &SearchArgs) -> Result<Value> {
        if args.extracted {
            self.client
                .search_extracted(args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
        } else if args.not_extracted {
            self.client
                .search_not_extracted(args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
        } else if let (Some(from), Some(to)) = (&args.modified_from, &args.modified_to) {
            self.client
                .search_last_modified(from, to, args.limit.unwrap_or(DEFAULT_RANGE_SEARCH_LIMIT))
        } else if let (Some(from), Some(to)) = (&args.harvested_from, &args.harvested_to) {
            self.client
                .search_last_harvested(from, to, args.limit.unwrap_or(DEFAULT_RANGE_SEARCH_LIMIT))
        } else {
            self.client.search(args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
        }
    }

    fn print(&self, value: Value) -> Result<()> {
        if value.is_null() {
            println!("No data found.");
        } else {
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Ok(())
    }

    /// Renders one aligned row per search result instead of dumping the
    /// whole response.
    fn print_item_table(&self) -> Result<()> {
        let response = self.client.search(DEFAULT_SEARCH_LIMIT)?;
        let results = response
            .get("results")
            .and_then(Value::as_array)
            .context("search response has no 'results' array")?;

        println!("{:<35}{:<27}{:<20}", "ItemID", "Last Harvested", "Name");
        for entry in results {
            let Some(result) = entry.get("result") else {
                continue;
            };
            let field = |name: &str, fallback: &str| {
                result
                    .get(name)
                    .and_then(Value::as_str)
                    .unwrap_or(fallback)
                    .to_string()
            };
            let container_and_name =
                format!("{}/{}", field("stow_container_id", "-"), field("name", "-"));
            println!(
                "{:<35}{:<27}{:<20}",
                field("_id", "-"),
                field("last_harvested", "never harvested"),
                container_and_name
            );
        }
        Ok(())
    }
}
