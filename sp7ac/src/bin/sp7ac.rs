use async_trait::async_trait;
use clap::{
    Parser,
    Subcommand,
};
use sp7ac::platform::{
    Builder as PlatformBuilder,
    CurrentUser,
};
use sp7core::{
    ac::{
        Policy,
        ResourcePath,
        StoredPolicies,
        query::{
            PermissionQuery,
            PermissionQueryRow,
            QueryOutcome,
        },
        role::{
            RoleRecord,
            RoleScope,
        },
        traits::{
            PermissionBackend,
            RoleBackend,
        },
    },
    error::BackendError,
};
use sp7rbac::{
    Builder as RegistryBuilder,
    Catalog,
    PolicyCodec,
    Registry,
    compressor::compress,
};
use std::{
    fs,
    path::PathBuf,
};

#[derive(Debug, Parser)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[clap(long, value_name = "SP7_CATALOG", env = "SP7_CATALOG")]
    catalog: PathBuf,
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Decode stored policies into the editable list
    #[command(arg_required_else_help = true)]
    Decode {
        input: PathBuf,
    },
    /// Encode a list of policies into the stored form
    #[command(arg_required_else_help = true)]
    Encode {
        input: PathBuf,
    },
    /// Fold the table rows of a query result into tool rows
    #[command(arg_required_else_help = true)]
    Compress {
        input: PathBuf,
    },
    /// Resolve permissions from a recorded query result
    #[command(arg_required_else_help = true)]
    Resolve {
        input: PathBuf,
        #[clap(long, default_value_t = 1)]
        user: i64,
        #[clap(long, default_value_t = 1)]
        collection: i64,
    },
    /// List the registry below the prefix
    Registry {
        prefix: Option<String>,
    },
}

// Replays a recorded query result for every query.
struct Replay {
    rows: Vec<PermissionQueryRow>,
    catalog: StoredPolicies,
}

#[async_trait]
impl PermissionBackend for Replay {
    async fn query_permissions(
        &self,
        _user_id: i64,
        _collection_id: i64,
        _queries: &[PermissionQuery],
    ) -> Result<Vec<QueryOutcome>, BackendError> {
        Ok(self.rows.iter().cloned().map(QueryOutcome::from).collect())
    }

    async fn fetch_policy_catalog(
        &self,
    ) -> Result<StoredPolicies, BackendError> {
        Ok(self.catalog.clone())
    }
}

#[async_trait]
impl RoleBackend for Replay {
    async fn fetch_roles(
        &self,
        _scope: RoleScope,
    ) -> Result<Option<Vec<RoleRecord>>, BackendError> {
        Ok(None)
    }

    async fn store_role(
        &self,
        _scope: RoleScope,
        _role: &RoleRecord,
    ) -> Result<i64, BackendError> {
        Err(BackendError::AppInvariantViolation("replay is read only".into()))
    }

    async fn store_user_policies(
        &self,
        _user_id: i64,
        _collection_id: Option<i64>,
        _policies: &StoredPolicies,
    ) -> Result<(), BackendError> {
        Err(BackendError::AppInvariantViolation("replay is read only".into()))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Cli::parse();
    stderrlog::new()
        .module(module_path!())
        .module("sp7ac")
        .module("sp7rbac")
        .verbosity((args.verbose as usize) + 1)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;

    let catalog = Catalog::from_json(&fs::read_to_string(&args.catalog)?)?;
    let registry = RegistryBuilder::new()
        .catalog(catalog)
        .build()?;

    match args.command {
        Commands::Decode { input } => {
            let stored: StoredPolicies = serde_json::from_str(&fs::read_to_string(input)?)?;
            let policies = PolicyCodec::new(&registry).decode(&stored);
            println!("{}", serde_json::to_string_pretty(&policies)?);
        },
        Commands::Encode { input } => {
            let policies: Vec<Policy> = serde_json::from_str(&fs::read_to_string(input)?)?;
            let stored = PolicyCodec::new(&registry).encode(&policies);
            println!("{}", serde_json::to_string_pretty(&stored)?);
        },
        Commands::Compress { input } => {
            let rows: Vec<PermissionQueryRow> = serde_json::from_str(&fs::read_to_string(input)?)?;
            let rows = PolicyCodec::new(&registry).expand_wildcard_actions(rows);
            println!("{}", serde_json::to_string_pretty(&compress(&registry, rows))?);
        },
        Commands::Resolve { input, user, collection } => {
            resolve(registry, input, user, collection).await?;
        },
        Commands::Registry { prefix } => {
            list_registry(&registry, prefix.as_deref());
        },
    }

    Ok(())
}

async fn resolve(
    registry: Registry,
    input: PathBuf,
    user_id: i64,
    collection_id: i64,
) -> anyhow::Result<()> {
    let rows: Vec<PermissionQueryRow> = serde_json::from_str(&fs::read_to_string(input)?)?;
    let backend = Replay {
        rows,
        catalog: registry.catalog().expected_policies(),
    };
    let platform = PlatformBuilder::new()
        .backend(backend)
        .registry(registry)
        .user(CurrentUser {
            user_id,
            collection_id,
            is_super_admin: false,
        })
        .build()?;
    let resolved = platform.resolve(collection_id).await?;
    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
        "operations": resolved.operations,
        "tables": resolved.tables,
        "derived": resolved.derived,
    }))?);
    Ok(())
}

fn list_registry(registry: &Registry, prefix: Option<&str>) {
    let prefix = prefix.map(ResourcePath::parse);
    for (path, node) in registry.leaves() {
        if let Some(prefix) = prefix.as_ref() {
            if !prefix.covers(&path) && !path.segments().starts_with(prefix.segments()) {
                continue;
            }
        }
        let scope = if node.is_institutional { "institution" } else { "collection" };
        println!("{path} [{}] ({scope}): {}", node.group_name, node.actions.join(", "));
    }
}
