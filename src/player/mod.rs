pub mod ipc;

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::PlayerError;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::store::{ManifestStore, PlaylistEntry, PlaylistStore};

/// How a playback session ended
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    /// Player exited cleanly; the entry is now marked played
    Played,
    /// Player exited early with a known position; the resume offset was
    /// persisted and the entry stays unplayed
    Interrupted { position: u64 },
    /// Player exited abnormally with no usable position; nothing mutated
    Failed,
    /// No manifest record, or its file vanished; nothing spawned or
    /// mutated
    FileMissing,
}

/// Knobs for a playback session
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    /// External player binary
    pub binary: String,
    /// Interval between position queries
    pub poll_interval: Duration,
    /// Backoff between control-socket connection attempts
    pub connect_retry: Duration,
    /// Bound on waiting for the poller to quiesce at reconciliation
    pub poller_grace: Duration,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            binary: "mpv".to_string(),
            poll_interval: Duration::from_secs(2),
            connect_retry: Duration::from_millis(500),
            poller_grace: Duration::from_secs(1),
        }
    }
}

/// Play one playlist entry through the external player and reconcile the
/// result into the playlist store.
///
/// Runs the session state machine: resolve the file, spawn the player
/// with a per-session control socket, poll the socket for the time
/// position while waiting for exit, then stop-join the poller and read
/// the last observed position. A clean exit marks the entry played; an
/// early exit with a known position persists the resume offset; anything
/// else mutates nothing.
pub async fn play_entry(
    manifest: &ManifestStore,
    playlists: &PlaylistStore,
    playlist: &str,
    entry: &PlaylistEntry,
    options: &PlayerOptions,
    reporter: &SharedProgressReporter,
) -> Result<PlaybackOutcome, PlayerError> {
    // Resolving
    let Some(path) = manifest.resolve_path(&entry.podcast, &entry.title)? else {
        return Ok(PlaybackOutcome::FileMissing);
    };
    if !path.exists() {
        return Ok(PlaybackOutcome::FileMissing);
    }

    reporter.report(ProgressEvent::PlaybackStarting {
        episode_title: entry.title.clone(),
    });

    // Spawning. The socket lives in a directory owned by this session,
    // so concurrent invocations of the application cannot collide.
    let session_dir = tempfile::Builder::new()
        .prefix("podplay-session-")
        .tempdir()
        .map_err(PlayerError::SessionDirFailed)?;
    let socket = session_dir.path().join("ctl.sock");

    let mut command = Command::new(&options.binary);
    command
        .arg(format!("--input-ipc-server={}", socket.display()))
        .arg("--no-video")
        .arg("--force-window=no")
        .arg("--quiet");
    if entry.position > 0 {
        command.arg(format!("--start={}", entry.position));
    }
    command
        .arg(&path)
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let mut child = command.spawn().map_err(|e| PlayerError::SpawnFailed {
        binary: options.binary.clone(),
        source: e,
    })?;

    // Monitoring: exit-waiter (this task) and status-poller share one
    // position slot and one stop signal.
    let position = Arc::new(Mutex::new(0u64));
    let stop = CancellationToken::new();
    let poller = tokio::spawn(ipc::poll_position(
        socket,
        position.clone(),
        stop.clone(),
        options.poll_interval,
        options.connect_retry,
    ));

    let status = child.wait().await;

    // Reconciling: stop the poller and let it quiesce before reading the
    // final position, so the read cannot race its last write.
    stop.cancel();
    let _ = timeout(options.poller_grace, poller).await;
    let final_position = *position.lock().unwrap();

    let status = status.map_err(PlayerError::WaitFailed)?;
    let outcome = resolve_outcome(status.success(), final_position);
    apply_outcome(playlists, playlist, &entry.title, &outcome)?;
    Ok(outcome)
}

/// Play a playlist's unplayed entries in stored order, one session at a
/// time. Each entry's result is independent; a failed spawn aborts only
/// that entry's attempt.
pub async fn play_playlist(
    manifest: &ManifestStore,
    playlists: &PlaylistStore,
    name: &str,
    options: &PlayerOptions,
    reporter: &SharedProgressReporter,
) -> Result<Vec<(PlaylistEntry, Result<PlaybackOutcome, PlayerError>)>, PlayerError> {
    let mut outcomes = Vec::new();
    for entry in playlists.get_entries(name)? {
        if entry.played {
            continue;
        }
        let result = play_entry(manifest, playlists, name, &entry, options, reporter).await;
        outcomes.push((entry, result));
    }
    Ok(outcomes)
}

fn resolve_outcome(clean_exit: bool, position: u64) -> PlaybackOutcome {
    if clean_exit {
        PlaybackOutcome::Played
    } else if position > 0 {
        PlaybackOutcome::Interrupted { position }
    } else {
        PlaybackOutcome::Failed
    }
}

fn apply_outcome(
    playlists: &PlaylistStore,
    playlist: &str,
    title: &str,
    outcome: &PlaybackOutcome,
) -> Result<(), PlayerError> {
    match outcome {
        PlaybackOutcome::Played => playlists.mark_played(playlist, title)?,
        PlaybackOutcome::Interrupted { position } => {
            playlists.update_position(playlist, title, *position)?
        }
        PlaybackOutcome::Failed | PlaybackOutcome::FileMissing => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopReporter;
    use crate::store::DownloadRecord;
    use tempfile::TempDir;

    fn setup_stores(dir: &TempDir) -> (ManifestStore, PlaylistStore) {
        let manifest = ManifestStore::open(&dir.path().join("manifest.db")).unwrap();
        let playlists = PlaylistStore::open(&dir.path().join("playlists.db")).unwrap();
        (manifest, playlists)
    }

    fn add_downloaded_episode(dir: &TempDir, manifest: &ManifestStore, title: &str) {
        let file = dir.path().join(format!("{title}.mp3"));
        std::fs::write(&file, b"audio").unwrap();
        manifest
            .add(&DownloadRecord::new(
                format!("id-{title}"),
                "tech",
                title,
                format!("https://example.com/{title}.mp3"),
                file,
            ))
            .unwrap();
    }

    fn entry(title: &str) -> PlaylistEntry {
        PlaylistEntry {
            podcast: "tech".to_string(),
            title: title.to_string(),
            played: false,
            position: 0,
        }
    }

    fn fast_options(binary: &str) -> PlayerOptions {
        PlayerOptions {
            binary: binary.to_string(),
            poll_interval: Duration::from_millis(10),
            connect_retry: Duration::from_millis(10),
            poller_grace: Duration::from_millis(200),
        }
    }

    #[test]
    fn clean_exit_wins_regardless_of_position() {
        assert_eq!(resolve_outcome(true, 0), PlaybackOutcome::Played);
        assert_eq!(resolve_outcome(true, 120), PlaybackOutcome::Played);
    }

    #[test]
    fn dirty_exit_with_position_resumes() {
        assert_eq!(
            resolve_outcome(false, 120),
            PlaybackOutcome::Interrupted { position: 120 }
        );
    }

    #[test]
    fn dirty_exit_without_position_fails() {
        assert_eq!(resolve_outcome(false, 0), PlaybackOutcome::Failed);
    }

    #[test]
    fn interrupted_outcome_persists_resume_offset() {
        let dir = TempDir::new().unwrap();
        let (_, playlists) = setup_stores(&dir);
        playlists.create("commute").unwrap();
        playlists.add_episode("commute", "tech", "Ep1").unwrap();

        apply_outcome(
            &playlists,
            "commute",
            "Ep1",
            &PlaybackOutcome::Interrupted { position: 120 },
        )
        .unwrap();

        let entries = playlists.get_entries("commute").unwrap();
        assert!(!entries[0].played);
        assert_eq!(entries[0].position, 120);
    }

    #[test]
    fn played_outcome_marks_entry_terminal() {
        let dir = TempDir::new().unwrap();
        let (_, playlists) = setup_stores(&dir);
        playlists.create("commute").unwrap();
        playlists.add_episode("commute", "tech", "Ep1").unwrap();
        playlists.update_position("commute", "Ep1", 42).unwrap();

        apply_outcome(&playlists, "commute", "Ep1", &PlaybackOutcome::Played).unwrap();

        let entries = playlists.get_entries("commute").unwrap();
        assert!(entries[0].played);
    }

    #[test]
    fn failed_outcome_mutates_nothing() {
        let dir = TempDir::new().unwrap();
        let (_, playlists) = setup_stores(&dir);
        playlists.create("commute").unwrap();
        playlists.add_episode("commute", "tech", "Ep1").unwrap();

        apply_outcome(&playlists, "commute", "Ep1", &PlaybackOutcome::Failed).unwrap();

        let entries = playlists.get_entries("commute").unwrap();
        assert!(!entries[0].played);
        assert_eq!(entries[0].position, 0);
    }

    #[tokio::test]
    async fn missing_file_is_benign_and_spawns_nothing() {
        let dir = TempDir::new().unwrap();
        let (manifest, playlists) = setup_stores(&dir);
        playlists.create("commute").unwrap();
        playlists.add_episode("commute", "tech", "Ep1").unwrap();

        let outcome = play_entry(
            &manifest,
            &playlists,
            "commute",
            &entry("Ep1"),
            &fast_options("mpv"),
            &NoopReporter::shared(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, PlaybackOutcome::FileMissing);
        let entries = playlists.get_entries("commute").unwrap();
        assert!(!entries[0].played);
        assert_eq!(entries[0].position, 0);
    }

    #[tokio::test]
    async fn clean_player_exit_marks_played() {
        let dir = TempDir::new().unwrap();
        let (manifest, playlists) = setup_stores(&dir);
        add_downloaded_episode(&dir, &manifest, "Ep1");
        playlists.create("commute").unwrap();
        playlists.add_episode("commute", "tech", "Ep1").unwrap();

        // "true" ignores its arguments and exits 0, standing in for a
        // player that ran to completion without ever creating the socket.
        let outcome = play_entry(
            &manifest,
            &playlists,
            "commute",
            &entry("Ep1"),
            &fast_options("true"),
            &NoopReporter::shared(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, PlaybackOutcome::Played);
        assert!(playlists.get_entries("commute").unwrap()[0].played);
    }

    #[tokio::test]
    async fn dirty_exit_without_socket_reports_failure() {
        let dir = TempDir::new().unwrap();
        let (manifest, playlists) = setup_stores(&dir);
        add_downloaded_episode(&dir, &manifest, "Ep1");
        playlists.create("commute").unwrap();
        playlists.add_episode("commute", "tech", "Ep1").unwrap();

        // "false" exits non-zero immediately; the control socket never
        // exists, so the position stays unknown.
        let outcome = play_entry(
            &manifest,
            &playlists,
            "commute",
            &entry("Ep1"),
            &fast_options("false"),
            &NoopReporter::shared(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, PlaybackOutcome::Failed);
        let entries = playlists.get_entries("commute").unwrap();
        assert!(!entries[0].played);
        assert_eq!(entries[0].position, 0);
    }

    #[tokio::test]
    async fn unspawnable_player_is_an_error_not_a_panic() {
        let dir = TempDir::new().unwrap();
        let (manifest, playlists) = setup_stores(&dir);
        add_downloaded_episode(&dir, &manifest, "Ep1");
        playlists.create("commute").unwrap();
        playlists.add_episode("commute", "tech", "Ep1").unwrap();

        let result = play_entry(
            &manifest,
            &playlists,
            "commute",
            &entry("Ep1"),
            &fast_options("/nonexistent/player-binary"),
            &NoopReporter::shared(),
        )
        .await;

        assert!(matches!(result, Err(PlayerError::SpawnFailed { .. })));
        let entries = playlists.get_entries("commute").unwrap();
        assert!(!entries[0].played);
    }

    #[tokio::test]
    async fn play_playlist_skips_played_entries() {
        let dir = TempDir::new().unwrap();
        let (manifest, playlists) = setup_stores(&dir);
        add_downloaded_episode(&dir, &manifest, "Ep1");
        add_downloaded_episode(&dir, &manifest, "Ep2");
        playlists.create("commute").unwrap();
        playlists.add_episode("commute", "tech", "Ep1").unwrap();
        playlists.add_episode("commute", "tech", "Ep2").unwrap();
        playlists.mark_played("commute", "Ep1").unwrap();

        let outcomes = play_playlist(
            &manifest,
            &playlists,
            "commute",
            &fast_options("true"),
            &NoopReporter::shared(),
        )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].0.title, "Ep2");
        assert!(matches!(outcomes[0].1, Ok(PlaybackOutcome::Played)));
    }
}
