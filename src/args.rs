use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "metagrid",
    version,
    about = "Query a Metagrid metadata-management server over HTTPS"
)]
pub struct Cli {
    /// Base URL of the server, e.g. https://metagrid.example.com
    #[arg(long, required = true, env = "METAGRID_SERVER_URL")]
    pub server_url: String,

    /// Bearer token sent with every request
    #[arg(long, required = true, env = "METAGRID_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Log every HTTP request before it is sent
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List all registered locations
    Locations,
    /// Show a single location
    Location { location_id: String },
    /// List enabled containers across all locations
    Containers,
    /// List every container under a location
    AllContainers { location_id: String },
    /// Dump the full search response for all items
    Items,
    /// Print a table of item ids with harvest state
    ItemIds,
    /// Fetch v1 metadata for an item
    Item { item_id: String },
    /// Fetch v2 metadata for an item
    ItemV2 { item_id: String },
    /// Delete an item's metadata from the server
    DeleteItem { item_id: String },
    /// Look up the item id assigned to a (location, container, path) triple
    ItemId {
        location_id: String,
        container_id: String,
        item_path: String,
    },
    /// Resolve a bucket/key storage reference to an item id
    Resolve { storage_key: String },
    /// Fetch v1 metadata for an item addressed by storage key
    ItemFromKey { storage_key: String },
    /// Force a harvest for an item addressed by storage key
    HarvestFromKey {
        storage_key: String,
        #[arg(long)]
        force: bool,
    },
    /// Schedule harvesting jobs
    #[command(subcommand)]
    Harvest(HarvestCommand),
    /// Manage keyword groups
    #[command(subcommand)]
    Keyword(KeywordCommand),
    /// Manage item comments
    #[command(subcommand)]
    Comment(CommentCommand),
    /// Manage item captions
    #[command(subcommand)]
    Captions(CaptionsCommand),
    /// Search the metadata index
    Search(SearchArgs),
    /// Open a scroll cursor over the index
    Scroll,
    /// Extract metadata for every harvested item, with a resume cache
    ExtractAll(ExtractAllArgs),
    /// Extract metadata for items whose stow URL contains a substring
    Extract(ExtractArgs),
    /// Server health check
    Health,
    /// Queue depths and running job counts
    Stats,
    /// Recent platform activity
    Activity,
    /// The authenticated user
    User,
    /// Platform summary
    Platform,
    /// Data summary
    Summary,
    /// Compilations summary
    Compilations,
    /// Feature flags enabled on the server
    Features,
    /// Raw GET against a relative path
    Get { path: String },
}

#[derive(Subcommand, Debug)]
pub enum HarvestCommand {
    /// Harvest a single item by its stow URL
    Item {
        location_id: String,
        container_id: String,
        stow_url: String,
        #[arg(long)]
        force: bool,
    },
    /// Harvest an entire container
    Container {
        location_id: String,
        container_id: String,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum KeywordCommand {
    /// List all keyword groups
    List,
    /// Show a keyword group
    Get { group_id: String },
    /// Create a keyword group with a display color
    CreateGroup { name: String, color: String },
    /// Delete a keyword group
    DeleteGroup { group_id: String },
    /// Add a word to a group
    Add { group_id: String, word: String },
    /// Remove a word from a group
    Remove { group_id: String, word: String },
}

#[derive(Subcommand, Debug)]
pub enum CommentCommand {
    /// Comment on an item
    Add { item_id: String, body: String },
    /// List the comments on an item
    List { item_id: String },
    /// Delete a comment
    Delete { comment_id: String },
}

#[derive(Subcommand, Debug)]
pub enum CaptionsCommand {
    /// Fetch the captions attached to an item
    Get { item_id: String },
    /// Upload a caption file and associate it with an item
    Upload { item_id: String, file: PathBuf },
    /// Delete a caption from an item
    Delete { item_id: String, caption_id: String },
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Maximum number of results to request (default 50000, or 1000 for
    /// date-range searches)
    #[arg(long)]
    pub limit: Option<u64>,

    /// Only items that have been extracted
    #[arg(long, conflicts_with = "not_extracted")]
    pub extracted: bool,

    /// Only items that have not been extracted
    #[arg(long)]
    pub not_extracted: bool,

    /// Lower bound on last_modified
    #[arg(long, requires = "modified_to")]
    pub modified_from: Option<String>,

    /// Upper bound on last_modified
    #[arg(long, requires = "modified_from")]
    pub modified_to: Option<String>,

    /// Lower bound on last_harvested
    #[arg(long, requires = "harvested_to")]
    pub harvested_from: Option<String>,

    /// Upper bound on last_harvested
    #[arg(long, requires = "harvested_from")]
    pub harvested_to: Option<String>,
}

#[derive(Args, Debug)]
pub struct ExtractAllArgs {
    /// JSON array of item ids already extracted; updated after every item
    #[arg(long)]
    pub cache_file: PathBuf,

    /// Directory the per-item metadata files are written under
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Reuse a saved search response instead of calling search
    #[arg(long)]
    pub search_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Only extract items whose stow URL contains this substring
    #[arg(short, long)]
    pub query: String,

    /// Directory the per-item metadata files are written under
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Reuse a saved search response instead of calling search
    #[arg(long)]
    pub search_file: Option<PathBuf>,
}
