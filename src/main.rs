//! apiwire CLI - call a configured service through the authenticated client.

use apiwire::{
    ClientError, Config, EndpointResolver, FileTokenStore, HttpClient, MutationOptions, QueryCache,
    QueryOptions, RequestDescriptor, ResourceApi, ResourceService, ResponseBody, SessionObserver,
    TokenStore,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "apiwire")]
#[command(about = "Call a configured service through the authenticated client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log verbosity level
    #[arg(short, long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a resource (cached query)
    Get {
        service: String,
        #[arg(default_value = "")]
        path: String,
        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },

    /// Create a resource
    Post {
        service: String,
        #[arg(default_value = "")]
        path: String,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },

    /// Replace a resource
    Put {
        service: String,
        #[arg(default_value = "")]
        path: String,
        #[arg(short, long)]
        data: Option<String>,
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },

    /// Partially update a resource
    Patch {
        service: String,
        #[arg(default_value = "")]
        path: String,
        #[arg(short, long)]
        data: Option<String>,
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },

    /// Delete a resource by id
    Delete {
        service: String,
        id: String,
        /// Path between the service endpoint and the id
        #[arg(long, default_value = "")]
        path: String,
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },

    /// Store an access token for subsequent calls
    Login { token: String },

    /// Clear every stored session key
    Logout,

    /// Show current configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
        }
    }
}

/// Writes auth events where a terminal user will see them.
struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn on_forbidden(&self, url: &str) {
        eprintln!("✗ You are not allowed to access this resource: {}", url);
    }

    fn on_session_expired(&self, login_route: &str) {
        eprintln!("✗ Session expired. Log in again ({}): apiwire login <token>", login_route);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level, cli.json_logs);

    let config = match cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let config = config.with_env_overrides();

    match cli.command {
        Commands::Config { path } => show_config(path, &config),
        Commands::Login { token } => {
            let store = FileTokenStore::open(&config.storage.path)?;
            store.set_access_token(&token)?;
            println!("→ Token stored in {}", store.path().display());
            Ok(())
        }
        Commands::Logout => {
            let store = FileTokenStore::open(&config.storage.path)?;
            store.clear_session()?;
            println!("→ Session cleared");
            Ok(())
        }
        Commands::Get { service, path, params } => {
            let conn = Connection::open(&config)?;
            let descriptor = with_params(RequestDescriptor::new(&path), params);
            let result = conn
                .service(&service)
                .get_query(descriptor, QueryOptions::new())
                .fetch()
                .await
                .map(|body| (*body).clone());
            conn.finish(result).await
        }
        Commands::Post { service, path, data, params } => {
            let conn = Connection::open(&config)?;
            let descriptor = with_params(RequestDescriptor::new(&path), params);
            let mutation = conn.service(&service).post_mutation(descriptor, MutationOptions::new());
            let result = mutation.mutate(parse_body(data)?).await;
            conn.finish(result).await
        }
        Commands::Put { service, path, data, params } => {
            let conn = Connection::open(&config)?;
            let descriptor = with_params(RequestDescriptor::new(&path), params);
            let mutation = conn.service(&service).put_mutation(descriptor, MutationOptions::new());
            let result = mutation.mutate(parse_body(data)?).await;
            conn.finish(result).await
        }
        Commands::Patch { service, path, data, params } => {
            let conn = Connection::open(&config)?;
            let descriptor = with_params(RequestDescriptor::new(&path), params);
            let mutation = conn.service(&service).patch_mutation(descriptor, MutationOptions::new());
            let result = mutation.mutate(parse_body(data)?).await;
            conn.finish(result).await
        }
        Commands::Delete { service, id, path, params } => {
            let conn = Connection::open(&config)?;
            let descriptor = with_params(RequestDescriptor::new(&path).id(id), params);
            let mutation = conn.service(&service).delete_mutation(descriptor, MutationOptions::new());
            let result = mutation.mutate(None).await;
            conn.finish(result).await
        }
    }
}

fn init_tracing(level: LogLevel, json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::from(level).into());

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

/// Composition root for request commands: one client, one cache, one resolver.
struct Connection {
    client: HttpClient,
    resolver: EndpointResolver,
    cache: QueryCache,
}

impl Connection {
    fn open(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;
        let resolver = EndpointResolver::new(&config.api.base_url)?;
        let tokens = Arc::new(FileTokenStore::open(&config.storage.path)?);
        let client = HttpClient::new(&config.api, tokens)?.with_observer(Arc::new(ConsoleObserver));

        Ok(Self {
            client,
            resolver,
            cache: QueryCache::new(&config.cache),
        })
    }

    fn service(&self, name: &str) -> ResourceApi {
        let service = ResourceService::new(self.client.clone(), self.resolver.resolve(name));
        ResourceApi::new(service, self.cache.clone())
    }

    async fn finish(&self, result: Result<ResponseBody, ClientError>) -> anyhow::Result<()> {
        // Let a pending re-authentication store its token before the process exits.
        self.client.join_reauth().await;

        match result {
            Ok(body) => print_body(&body),
            Err(ClientError::Unauthenticated { url }) => {
                anyhow::bail!("unauthenticated request to {}; token refresh attempted, retry the command", url)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn with_params(descriptor: RequestDescriptor, params: Vec<(String, String)>) -> RequestDescriptor {
    params
        .into_iter()
        .fold(descriptor, |d, (key, value)| d.param(&key, &value))
}

fn parse_body(data: Option<String>) -> anyhow::Result<Option<serde_json::Value>> {
    data.map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| anyhow::anyhow!("--data is not valid JSON: {}", e))
}

fn print_body(body: &ResponseBody) -> anyhow::Result<()> {
    match body {
        ResponseBody::Json(value) => println!("{}", serde_json::to_string_pretty(value)?),
        ResponseBody::Raw(raw) => {
            println!("HTTP {}", raw.status);
            if !raw.body.is_empty() {
                println!("{}", raw.body);
            }
        }
    }
    Ok(())
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid key=value: no `=` found in `{}`", s))?;
    Ok((key.to_string(), value.to_string()))
}

fn show_config(show_path: bool, config: &Config) -> anyhow::Result<()> {
    if show_path {
        println!("{}", Config::default_path().display());
        return Ok(());
    }

    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
