use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::api::ClientConfig;
use crate::transfer::TransferOptions;

/// Command line arguments for the Dropbox push tool
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "dbx-push",
    about = "A multithreaded Dropbox folder upload tool written in Rust"
)]
pub struct Args {
    /// Log output format: json (default) or text
    #[clap(long, default_value = "json")]
    pub fmt: String,

    /// Name of a single file to upload
    #[clap(long)]
    pub file: Option<String>,

    /// Local folder to upload recursively, or the name of the remote
    /// folder to create
    #[clap(long)]
    pub folder: Option<String>,

    /// Remote destination folder, relative to the root
    #[clap(long, default_value = "")]
    pub rfolder: String,

    /// List the contents of the remote folder (or root)
    #[clap(long)]
    pub list: bool,

    /// Upload the specified file or folder
    #[clap(long)]
    pub upload: bool,

    /// Create a remote folder named by --folder under --rfolder
    #[clap(long)]
    pub create: bool,

    /// Number of concurrent uploads per directory level
    #[clap(short, long, default_value = "10")]
    pub concurrency: usize,

    /// Access token; falls back to the DROPBOX_TOKEN environment variable
    #[clap(long)]
    pub token: Option<String>,

    /// Per-request timeout in seconds
    #[clap(long, default_value = "10")]
    pub timeout: u64,

    /// Skip TLS certificate verification
    #[clap(long)]
    pub insecure: bool,

    /// Follow search result pages when checking whether a file already
    /// exists remotely, instead of inspecting only the first page
    #[clap(long)]
    pub exhaustive_search: bool,
}

#[derive(Debug, Clone)]
pub enum Operation {
    List {
        remote_path: String,
    },
    UploadFile {
        file_name: String,
        local_dir: PathBuf,
        remote_dir: String,
    },
    UploadTree {
        local_dir: PathBuf,
        remote_dir: String,
    },
    CreateFolder {
        name: String,
        remote_parent: String,
    },
}

/// Everything a run needs, assembled once and passed by reference.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub op: Operation,
    pub client: ClientConfig,
    pub transfer: TransferOptions,
}

/// Parse command line arguments
pub fn parse_args() -> Args {
    Args::parse()
}

/// Process command line arguments into a RunConfig
pub fn process_args(args: &Args) -> Result<RunConfig> {
    let op = if args.list {
        Operation::List {
            remote_path: args.rfolder.clone(),
        }
    } else if args.upload {
        if let Some(file) = &args.file {
            Operation::UploadFile {
                file_name: file.clone(),
                local_dir: PathBuf::from(args.folder.clone().unwrap_or_default()),
                remote_dir: args.rfolder.clone(),
            }
        } else if let Some(folder) = &args.folder {
            Operation::UploadTree {
                local_dir: PathBuf::from(folder),
                remote_dir: args.rfolder.clone(),
            }
        } else {
            return Err(anyhow!("Nothing to upload: pass --file or --folder"));
        }
    } else if args.create {
        match &args.folder {
            Some(folder) => Operation::CreateFolder {
                name: folder.clone(),
                remote_parent: args.rfolder.clone(),
            },
            None => return Err(anyhow!("Nothing to create: pass --folder")),
        }
    } else {
        return Err(anyhow!(
            "No operation requested: pass --list, --upload or --create"
        ));
    };

    let token = args
        .token
        .clone()
        .or_else(|| std::env::var("DROPBOX_TOKEN").ok())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| anyhow!("No access token: pass --token or set DROPBOX_TOKEN"))?;

    if args.concurrency == 0 {
        return Err(anyhow!("Concurrency must be at least 1"));
    }

    Ok(RunConfig {
        op,
        client: ClientConfig {
            token,
            timeout_secs: args.timeout,
            insecure: args.insecure,
            ..ClientConfig::default()
        },
        transfer: TransferOptions {
            concurrency: args.concurrency,
            exhaustive_search: args.exhaustive_search,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            fmt: "json".to_string(),
            file: None,
            folder: None,
            rfolder: String::new(),
            list: false,
            upload: false,
            create: false,
            concurrency: 10,
            token: Some("tok".to_string()),
            timeout: 10,
            insecure: false,
            exhaustive_search: false,
        }
    }

    #[test]
    fn upload_with_file_selects_single_file_upload() {
        let mut args = base_args();
        args.upload = true;
        args.file = Some("a.txt".to_string());
        args.folder = Some("docs".to_string());
        args.rfolder = "backups".to_string();

        let config = process_args(&args).unwrap();
        match config.op {
            Operation::UploadFile {
                file_name,
                local_dir,
                remote_dir,
            } => {
                assert_eq!(file_name, "a.txt");
                assert_eq!(local_dir, PathBuf::from("docs"));
                assert_eq!(remote_dir, "backups");
            }
            other => panic!("unexpected operation: {:?}", other),
        }
    }

    #[test]
    fn upload_with_folder_only_selects_tree_upload() {
        let mut args = base_args();
        args.upload = true;
        args.folder = Some("docs".to_string());

        let config = process_args(&args).unwrap();
        assert!(matches!(config.op, Operation::UploadTree { .. }));
    }

    #[test]
    fn upload_without_file_or_folder_is_rejected() {
        let mut args = base_args();
        args.upload = true;
        assert!(process_args(&args).is_err());
    }

    #[test]
    fn create_without_folder_is_rejected() {
        let mut args = base_args();
        args.create = true;
        assert!(process_args(&args).is_err());
    }

    #[test]
    fn no_operation_is_rejected() {
        let args = base_args();
        assert!(process_args(&args).is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut args = base_args();
        args.list = true;
        args.concurrency = 0;
        assert!(process_args(&args).is_err());
    }
}
