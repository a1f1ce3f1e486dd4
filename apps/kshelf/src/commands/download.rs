//! Download command for the kshelf CLI.
//!
//! Starts a download through the manager and follows its events until the
//! release settles. Ctrl-C cancels the download and waits for the
//! cancellation to finish before exiting.
//!
//! ## Usage
//!
//! ```bash
//! kshelf download 2.0.20
//! kshelf download 2.0.20 --timestamp 1724320800000
//! ```

use std::io::Write;

use anyhow::{Result, bail};
use kshelf_core::{NoticeKind, ReleaseId, ShelfEvent, Status};
use tokio::sync::broadcast::error::RecvError;

use super::{ReleaseArgs, Session, busy};
use crate::errors::KshelfError;

/// Executes the download command.
///
/// # Errors
///
/// Returns an error if the release is unknown or busy, the download fails,
/// or the user interrupts it.
pub async fn execute(args: &ReleaseArgs) -> Result<()> {
    let session = Session::open().await?;
    let release = session.resolve(args)?;

    match session.status(&release) {
        Status::Downloaded => {
            println!("Release {} is already downloaded.", release.version);
            return Ok(());
        }
        Status::NotDownloaded => {}
        status @ (Status::Downloading { .. } | Status::Cancelling | Status::Removing) => {
            return Err(busy(&release, status));
        }
    }

    // Subscribe first so no event of this download is missed.
    let mut events = session.manager.subscribe();
    if !session.manager.download(&release).is_applied() {
        return Err(busy(&release, session.status(&release)));
    }
    println!(
        "Downloading {} ({})...",
        release.version,
        release.published_on()
    );

    let outcome = follow(&session, &release, &mut events).await;
    session.close().await;
    outcome
}

async fn follow(
    session: &Session,
    release: &ReleaseId,
    events: &mut tokio::sync::broadcast::Receiver<ShelfEvent>,
) -> Result<()> {
    let mut failure: Option<String> = None;
    let mut shown: Option<Status> = None;
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        let status = session.status(release);
        if shown != Some(status) {
            print_progress(status);
            shown = Some(status);
        }
        match status {
            Status::Downloaded => {
                println!();
                println!("Release {} downloaded.", release.version);
                return Ok(());
            }
            Status::NotDownloaded => {
                println!();
                match failure {
                    Some(message) => bail!(message),
                    None => bail!("download of {} did not complete", release.version),
                }
            }
            Status::Downloading { .. } | Status::Cancelling | Status::Removing => {}
        }

        tokio::select! {
            _ = &mut interrupt => {
                return cancel(session, release).await;
            }
            event = events.recv() => match event {
                Ok(ShelfEvent::Notice(notice)) if notice.kind != NoticeKind::Info => {
                    failure = Some(notice.message);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => bail!("manager shut down"),
            },
        }
    }
}

async fn cancel(session: &Session, release: &ReleaseId) -> Result<()> {
    println!();
    println!("Cancelling...");
    session.manager.cancel(release);
    session
        .manager
        .wait_for(release, |status| !status.is_some_and(Status::is_busy))
        .await;
    println!("Download cancelled.");
    Err(KshelfError::Interrupted.into())
}

fn print_progress(status: Status) {
    print!("\r  {:<16}", status.label());
    let _ = std::io::stdout().flush();
}
