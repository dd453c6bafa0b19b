use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use tokio::fs;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::api::DropboxClient;
use crate::cli::{Operation, RunConfig};
use crate::errors::Error;
use crate::summary::{TransferSummary, UploadStatus};

/// Knobs for the upload pipeline, separate from connection settings.
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    /// Upper bound on concurrent uploads within one directory level.
    pub concurrency: usize,
    /// Follow search pagination in the existence check. When off, only the
    /// first result page is inspected and a match beyond it goes unnoticed,
    /// so the file is uploaded again.
    pub exhaustive_search: bool,
}

/// Run the configured operation against the remote.
pub async fn run(config: &RunConfig) -> Result<()> {
    let client = DropboxClient::new(&config.client)?;

    match &config.op {
        Operation::List { remote_path } => {
            let listing = client.list_folder(&absolute_remote(remote_path)).await?;
            for entry in &listing.entries {
                println!("{}", entry.name);
            }
            if listing.has_more {
                warn!("Listing is truncated; the remote folder has more entries");
            }
        }
        Operation::UploadFile {
            file_name,
            local_dir,
            remote_dir,
        } => {
            if let Err(e) =
                upload_file(&client, &config.transfer, file_name, local_dir, remote_dir).await
            {
                warn!("Couldn't upload file {}: {}", file_name, e);
            }
        }
        Operation::UploadTree {
            local_dir,
            remote_dir,
        } => {
            match upload_tree(
                &client,
                &config.transfer,
                local_dir.clone(),
                remote_dir.clone(),
            )
            .await
            {
                Ok(summary) => summary.report(),
                Err(e) => warn!("Couldn't upload folder {}: {}", local_dir.display(), e),
            }
        }
        Operation::CreateFolder {
            name,
            remote_parent,
        } => match create_remote_folder(&client, name, remote_parent).await {
            Ok(()) => info!("Created remote folder {}", remote_target(remote_parent, name)),
            Err(e) => warn!(
                "Couldn't create remote folder {}: {}",
                remote_target(remote_parent, name),
                e
            ),
        },
    }

    Ok(())
}

/// Check whether `file_name` already exists at its exact target path.
///
/// The underlying search matches by file name, so it can return unrelated
/// candidates from other folders; only an exact display-path match counts.
/// A failed search is reported as "does not exist", which errs toward
/// uploading again rather than silently skipping.
pub async fn remote_file_exists(
    client: &DropboxClient,
    opts: &TransferOptions,
    remote_dir: &str,
    file_name: &str,
) -> bool {
    let expected = join_remote(remote_dir, file_name);
    let scope = absolute_remote(remote_dir);

    let mut start = 0;
    loop {
        let page = match client.search(&scope, file_name, start).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Search for {} failed: {}", expected, e);
                return false;
            }
        };

        if page
            .matches
            .iter()
            .any(|m| m.metadata.path_display == expected)
        {
            return true;
        }

        if !(opts.exhaustive_search && page.more) {
            return false;
        }
        // A page that does not advance the offset ends the scan.
        if page.start <= start {
            return false;
        }
        start = page.start;
    }
}

/// Upload one local file into a remote folder, unless it is already there.
pub async fn upload_file(
    client: &DropboxClient,
    opts: &TransferOptions,
    file_name: &str,
    local_dir: &Path,
    remote_dir: &str,
) -> Result<UploadStatus, Error> {
    let local_path = local_dir.join(file_name);
    let bytes = fs::read(&local_path)
        .await
        .map_err(|e| Error::local_io(&local_path, e))?;

    if remote_file_exists(client, opts, remote_dir, file_name).await {
        info!(
            "File {} exists. Skipping",
            join_remote(remote_dir, file_name)
        );
        return Ok(UploadStatus::Skipped);
    }

    let metadata = client
        .upload(&remote_target(remote_dir, file_name), bytes)
        .await?;
    info!(
        "File {} uploaded to \"{}\". Size is {}",
        file_name, metadata.path_display, metadata.size
    );
    Ok(UploadStatus::Uploaded(metadata.size))
}

/// Create the remote folder `remote_parent/local_name`. Safe to call for a
/// folder that already exists.
pub async fn create_remote_folder(
    client: &DropboxClient,
    local_name: &str,
    remote_parent: &str,
) -> Result<(), Error> {
    client
        .create_folder(&remote_target(remote_parent, local_name))
        .await
}

/// Walk `local_dir` and mirror it into `remote_dir`.
///
/// Subdirectories are handled one at a time: the remote folder is created
/// first, and only on success does the walk descend, so a parent folder
/// always exists before anything is uploaded into it. A subdirectory whose
/// folder cannot be created is skipped whole, and the walk continues with
/// its siblings. Files of the current directory are then uploaded
/// concurrently, bounded by the configured limit, and the walk does not
/// return until every dispatched upload has reported an outcome.
pub fn upload_tree<'a>(
    client: &'a DropboxClient,
    opts: &'a TransferOptions,
    local_dir: PathBuf,
    remote_dir: String,
) -> BoxFuture<'a, Result<TransferSummary, Error>> {
    async move {
        let mut entries = fs::read_dir(&local_dir)
            .await
            .map_err(|e| Error::local_io(&local_dir, e))?;

        let mut subdirs = Vec::new();
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::local_io(&local_dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => subdirs.push(name),
                Ok(_) => files.push(name),
                Err(e) => warn!("Couldn't stat {}: {}", entry.path().display(), e),
            }
        }
        subdirs.sort();
        files.sort();

        let mut summary = TransferSummary::default();

        for name in subdirs {
            if let Err(e) = create_remote_folder(client, &name, &remote_dir).await {
                warn!(
                    "Couldn't create remote folder {}: {}",
                    remote_target(&remote_dir, &name),
                    e
                );
                summary.dirs_skipped += 1;
                continue;
            }
            let child_local = local_dir.join(&name);
            match upload_tree(client, opts, child_local.clone(), join_remote(&remote_dir, &name))
                .await
            {
                Ok(child) => summary.absorb(child),
                Err(e) => {
                    warn!("Skipping folder {}: {}", child_local.display(), e);
                    summary.dirs_skipped += 1;
                }
            }
        }

        let semaphore = Arc::new(Semaphore::new(opts.concurrency));
        let outcomes = stream::iter(files)
            .map(|name| {
                let permit = semaphore.clone();
                let local_dir = local_dir.clone();
                let remote_dir = remote_dir.clone();

                async move {
                    let _permit = permit.acquire().await.unwrap();
                    let outcome =
                        upload_file(client, opts, &name, &local_dir, &remote_dir).await;
                    if let Err(e) = &outcome {
                        warn!(
                            "Couldn't upload file {} to remote folder \"{}\": {}",
                            name, remote_dir, e
                        );
                    }
                    outcome
                }
            })
            .buffer_unordered(opts.concurrency)
            .collect::<Vec<_>>()
            .await;

        for outcome in &outcomes {
            summary.record(outcome);
        }

        Ok(summary)
    }
    .boxed()
}

/// Remote path of `name` inside `remote_dir`, the way the remote displays
/// it in search results: bare name at the root, `dir/name` otherwise.
pub(crate) fn join_remote(remote_dir: &str, name: &str) -> String {
    if remote_dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", remote_dir, name)
    }
}

/// Absolute target path for the create and upload endpoints.
pub(crate) fn remote_target(remote_dir: &str, name: &str) -> String {
    format!("/{}", join_remote(remote_dir.trim_start_matches('/'), name))
}

/// The remote expects the empty string for the root folder and a leading
/// slash everywhere else.
fn absolute_remote(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("/{}", path.trim_start_matches('/'))
    }
}
