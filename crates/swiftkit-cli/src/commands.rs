//! Command parsing and dispatch.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use reqwest::header::HeaderMap;
use swiftkit_core::models::{ListFormat, ListOptions, Metadata, ObjectEntry};
use swiftkit_core::tempurl::TempUrlOptions;
use swiftkit_core::{SwiftClient, SwiftConfig};
use tracing::{info, warn};

use crate::config::{self, CliConfig};
use crate::credentials::CredentialStore;

pub const USAGE: &str = "\
Usage: swiftkit <command> [args]

Commands:
  login [--save]                         Authenticate and show the storage endpoint
  logout                                 Forget the saved password
  containers                             List containers
  create <container>                     Create a container
  list <container> [prefix]              List objects
  upload <container> <file> [name]       Upload a local file
  download <container> <name> [file]     Download an object
  copy <src-container> <src> <dst-container> <dst>
                                         Server-side copy
  rm <container> <name>                  Delete an object
  rm-all <container>                     Delete every object in a container
  stat [container [name]]                Show account, container or object metadata
  set-acl <container> <acl>              Set the container read ACL
  set-versions <container> <versions>    Set the versions container
  set-temp-key <key>                     Set the account temp URL key
  tempurl <method> <container> <name> <key> [seconds]
                                         Print a temporary URL

Configuration comes from OS_* variables (or .env), SWIFTKIT_CONFIG,
and ~/.config/swiftkit/config.json. RUST_LOG controls logging.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { save: bool },
    Logout,
    Containers,
    Create { container: String },
    List { container: String, prefix: Option<String> },
    Upload { container: String, file: PathBuf, name: Option<String> },
    Download { container: String, name: String, file: Option<PathBuf> },
    Copy { src_container: String, src: String, dst_container: String, dst: String },
    Remove { container: String, name: String },
    RemoveAll { container: String },
    Stat { container: Option<String>, name: Option<String> },
    SetAcl { container: String, acl: String },
    SetVersions { container: String, versions: String },
    SetTempKey { key: String },
    TempUrl { method: String, container: String, name: String, key: String, seconds: Option<u64> },
    Help,
}

fn arg(args: &[String], index: usize, what: &str) -> Result<String> {
    args.get(index)
        .cloned()
        .with_context(|| format!("Missing argument: {}\n\n{}", what, USAGE))
}

fn opt(args: &[String], index: usize) -> Option<String> {
    args.get(index).cloned()
}

impl Command {
    /// Parse the arguments after the program name
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some(name) = args.first() else {
            return Ok(Command::Help);
        };
        let rest = &args[1..];

        let command = match name.as_str() {
            "login" => Command::Login {
                save: rest.iter().any(|a| a == "--save"),
            },
            "logout" => Command::Logout,
            "containers" => Command::Containers,
            "create" => Command::Create {
                container: arg(rest, 0, "container")?,
            },
            "list" | "ls" => Command::List {
                container: arg(rest, 0, "container")?,
                prefix: opt(rest, 1),
            },
            "upload" => Command::Upload {
                container: arg(rest, 0, "container")?,
                file: PathBuf::from(arg(rest, 1, "file")?),
                name: opt(rest, 2),
            },
            "download" => Command::Download {
                container: arg(rest, 0, "container")?,
                name: arg(rest, 1, "object name")?,
                file: opt(rest, 2).map(PathBuf::from),
            },
            "copy" | "cp" => Command::Copy {
                src_container: arg(rest, 0, "source container")?,
                src: arg(rest, 1, "source object")?,
                dst_container: arg(rest, 2, "destination container")?,
                dst: arg(rest, 3, "destination object")?,
            },
            "rm" => Command::Remove {
                container: arg(rest, 0, "container")?,
                name: arg(rest, 1, "object name")?,
            },
            "rm-all" => Command::RemoveAll {
                container: arg(rest, 0, "container")?,
            },
            "stat" => Command::Stat {
                container: opt(rest, 0),
                name: opt(rest, 1),
            },
            "set-acl" => Command::SetAcl {
                container: arg(rest, 0, "container")?,
                acl: arg(rest, 1, "acl")?,
            },
            "set-versions" => Command::SetVersions {
                container: arg(rest, 0, "container")?,
                versions: arg(rest, 1, "versions container")?,
            },
            "set-temp-key" => Command::SetTempKey {
                key: arg(rest, 0, "key")?,
            },
            "tempurl" => Command::TempUrl {
                method: arg(rest, 0, "method")?,
                container: arg(rest, 1, "container")?,
                name: arg(rest, 2, "object name")?,
                key: arg(rest, 3, "key")?,
                seconds: match opt(rest, 4) {
                    Some(s) => Some(s.parse().with_context(|| format!("Invalid seconds '{}'", s))?),
                    None => None,
                },
            },
            "help" | "-h" | "--help" => Command::Help,
            other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
        };
        Ok(command)
    }
}

/// Object name for an upload: explicit, else the file name
fn upload_name(file: &Path, name: Option<String>) -> Result<String> {
    match name {
        Some(name) => Ok(name),
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("Cannot derive an object name from {}", file.display())),
    }
}

/// Local path for a download: explicit, else the last path segment of the object
fn download_path(name: &str, file: Option<PathBuf>) -> PathBuf {
    file.unwrap_or_else(|| PathBuf::from(name.rsplit('/').next().unwrap_or(name)))
}

fn print_metadata(metadata: &Metadata) {
    let mut headers: Vec<(String, String)> = metadata
        .headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    headers.sort();
    for (name, value) in headers {
        println!("{:>32}: {}", name, value);
    }
}

pub async fn run(command: Command, cli: &mut CliConfig) -> Result<()> {
    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }
    if command == Command::Logout {
        let username = cli
            .last_username
            .clone()
            .context("No saved username")?;
        CredentialStore::delete(&username)?;
        println!("Removed saved password for {}", username);
        return Ok(());
    }

    let config: SwiftConfig = config::resolve(cli)?;
    let client = SwiftClient::new(config.clone())?;

    match command {
        Command::Login { save } => {
            let session = client.session().ensure_session().await?;
            println!("Authenticated as {}", client.session().credentials().username);
            println!("Storage URL: {}", session.service_url());
            match (session.session.expires_at, session.session.time_until_expiry()) {
                (Some(at), Some(left)) => println!(
                    "Token expires: {} ({} minutes)",
                    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                    left.num_minutes()
                ),
                _ => println!("Token expires: unknown"),
            }
            if save {
                let credentials = &config.credentials;
                if let Err(e) = CredentialStore::store(&credentials.username, &credentials.password) {
                    warn!(error = %e, "Failed to store credentials");
                }
                cli.remember(credentials);
                cli.save()?;
                info!(username = %credentials.username, "Saved login");
                println!("Saved login for {}", credentials.username);
            }
        }
        Command::Containers => {
            let listing = client.list_containers(ListOptions::new()).await?;
            for container in listing.entries().unwrap_or_default() {
                println!("{:>10} {:>14}  {}", container.count, container.bytes, container.name);
            }
        }
        Command::Create { container } => {
            let status = client.create_container(&container, HeaderMap::new()).await?;
            println!("{} ({})", container, status);
        }
        Command::List { container, prefix } => {
            let mut options = ListOptions::new().format(ListFormat::Json);
            if let Some(prefix) = prefix {
                options = options.prefix(prefix);
            }
            let listing = client.list_files(&container, options).await?;
            for entry in listing.entries().unwrap_or_default() {
                match entry {
                    ObjectEntry::Object(info) => println!("{:>14}  {}", info.bytes, info.name),
                    ObjectEntry::Subdir { subdir } => println!("{:>14}  {}", "-", subdir),
                }
            }
        }
        Command::Upload { container, file, name } => {
            let name = upload_name(&file, name)?;
            let written = client
                .upload(swiftkit_core::api::UploadRequest::file(&container, &name, &file))
                .await?;
            println!("{}", written.url);
        }
        Command::Download { container, name, file } => {
            let object = client.download(&container, &name).await?;
            let path = download_path(&name, file);
            tokio::fs::write(&path, &object.body)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            let size = object.content_length().unwrap_or(object.body.len() as u64);
            match object.etag() {
                Some(etag) => println!("{} ({} bytes, etag {})", path.display(), size, etag),
                None => println!("{} ({} bytes)", path.display(), size),
            }
        }
        Command::Copy { src_container, src, dst_container, dst } => {
            let written = client.copy_file(&src_container, &src, &dst_container, &dst).await?;
            println!("{}", written.url);
        }
        Command::Remove { container, name } => {
            client.remove_file(&container, &name).await?;
        }
        Command::RemoveAll { container } => {
            let outcome = client.remove_all_files(&container).await?;
            println!("Removed {} objects", outcome.removed.len());
            for (name, error) in &outcome.failed {
                eprintln!("Failed to remove {}: {}", name, error);
            }
            if !outcome.failed.is_empty() {
                bail!("{} objects could not be removed", outcome.failed.len());
            }
        }
        Command::Stat { container, name } => {
            let metadata = match (container, name) {
                (Some(container), Some(name)) => client.get_object_metadata(&container, &name).await?,
                (Some(container), None) => client.get_container_metadata(&container).await?,
                _ => client.get_account_metadata().await?,
            };
            print_metadata(&metadata);
        }
        Command::SetAcl { container, acl } => {
            client.set_meta_read_acl(&container, &acl).await?;
        }
        Command::SetVersions { container, versions } => {
            client.set_meta_versions_location(&container, &versions).await?;
        }
        Command::SetTempKey { key } => {
            client.set_meta_temp_url_key(&key).await?;
        }
        Command::TempUrl { method, container, name, key, seconds } => {
            let mut options = TempUrlOptions::new(method, container, name, key);
            if let Some(seconds) = seconds {
                options = options.duration_secs(seconds);
            }
            println!("{}", client.create_temp_url(&options).await?);
        }
        Command::Help | Command::Logout => {}
    }
    Ok(())
}
