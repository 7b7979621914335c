use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};

use podplay::{
    DownloadOutcome, Episode, NoopReporter, PlaybackOutcome, PlayerError, PlayerOptions, PodFile,
    ProgressEvent, ProgressReporter, ReqwestClient, SharedProgressReporter, download_episode,
    fetch_feed, play_playlist,
    store::{ManifestStore, PlaylistStore, QueueStore},
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "[-] ");
static PAUSE: Emoji<'_, '_> = Emoji("⏸ ", "[=] ");
static PLAY: Emoji<'_, '_> = Emoji("▶ ", "[>] ");

/// Download podcasts and play them with resumable positions
#[derive(Parser, Debug)]
#[command(name = "podplay")]
#[command(about = "Download podcasts and play them with resumable positions")]
#[command(version)]
struct Args {
    /// Directory holding the podcast registry and databases
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty podcast registry
    Init,

    /// Register a podcast feed
    Add {
        name: String,
        rss_url: String,
        /// Download directory for this podcast
        #[arg(short, long)]
        directory: Option<PathBuf>,
    },

    /// Remove a podcast from the registry
    Remove { name: String },

    /// Rename a registered podcast
    Rename { old: String, new: String },

    /// List registered podcasts
    List,

    /// Download episodes of a podcast
    Download {
        name: String,

        /// Number of most recent episodes to download
        #[arg(short = 'n', long, default_value_t = 5, conflicts_with_all = ["all", "title"])]
        count: usize,

        /// Download every episode in the feed
        #[arg(long, conflicts_with = "title")]
        all: bool,

        /// Download a single episode by exact title
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Search episode titles and descriptions
    Search {
        query: String,
        /// Restrict the search to one podcast
        #[arg(short, long)]
        podcast: Option<String>,
    },

    /// Clear manifest records for a podcast
    Clean { name: String },

    /// Manage the download queue
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Manage playlists
    #[command(subcommand)]
    Playlist(PlaylistCommand),
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
    /// Queue an episode for a later batch download
    Add { podcast: String, title: String },
    /// Show queued episodes
    List,
    /// Download everything in the queue
    Download,
    /// Remove a queued episode by title
    Remove { title: String },
    /// Empty the queue
    Reset,
}

#[derive(Subcommand, Debug)]
enum PlaylistCommand {
    /// Show all playlists
    List,
    /// Create a playlist
    Create { name: String },
    /// Delete a playlist and its entries
    Delete { name: String },
    /// Rename a playlist
    Rename { old: String, new: String },
    /// Add an episode to a playlist
    Add {
        playlist: String,
        podcast: String,
        title: String,
    },
    /// Show a playlist's entries
    Show { name: String },
    /// Play a playlist's unplayed entries in order
    Play { name: String },
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    main_bar: ProgressBar,
    download_bar: Mutex<Option<ProgressBar>>,
}

impl IndicatifReporter {
    fn new() -> Self {
        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap();

        // Not ticking yet: commands that never touch the network should
        // not render a spinner line
        let main_bar = ProgressBar::new_spinner();
        main_bar.set_style(main_style);

        Self {
            main_bar,
            download_bar: Mutex::new(None),
        }
    }

    fn finish_download_bar(&self) {
        if let Some(bar) = self.download_bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { url } => {
                self.main_bar
                    .enable_steady_tick(std::time::Duration::from_millis(100));
                self.main_bar
                    .set_message(format!("{SEARCH}Fetching feed: {}", url.cyan()));
            }

            ProgressEvent::FeedFetched {
                podcast_title,
                episode_count,
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} • {} episodes",
                    podcast_title.bold().green(),
                    episode_count.to_string().cyan(),
                ));
            }

            ProgressEvent::DownloadStarting {
                episode_title,
                content_length,
            } => {
                // An unknown content length shows an indeterminate spinner
                let bar = match content_length {
                    Some(total) => {
                        let bar = ProgressBar::new(total);
                        bar.set_style(
                            ProgressStyle::default_bar()
                                .template(&format!(
                                    "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
                                ))
                                .unwrap()
                                .progress_chars("█▓░"),
                        );
                        bar
                    }
                    None => {
                        let bar = ProgressBar::new_spinner();
                        bar.set_style(
                            ProgressStyle::default_bar()
                                .template(&format!("  {DOWNLOAD}{{spinner}} {{bytes}} {{wide_msg}}"))
                                .unwrap(),
                        );
                        bar
                    }
                };
                bar.set_message(truncate_title(&episode_title, 40));
                *self.download_bar.lock().unwrap() = Some(bar);
            }

            ProgressEvent::DownloadProgress {
                bytes_downloaded,
                total_bytes,
            } => {
                if let Some(bar) = self.download_bar.lock().unwrap().as_ref() {
                    if let Some(total) = total_bytes {
                        bar.set_length(total);
                    }
                    bar.set_position(bytes_downloaded);
                }
            }

            ProgressEvent::Finalizing { episode_title } => {
                if let Some(bar) = self.download_bar.lock().unwrap().as_ref() {
                    bar.set_message(format!("finalizing {}", truncate_title(&episode_title, 40)));
                }
            }

            ProgressEvent::DownloadCompleted { .. } | ProgressEvent::DownloadFailed { .. } => {
                self.finish_download_bar();
            }

            ProgressEvent::PlaybackStarting { episode_title } => {
                println!(
                    "\n{PLAY}{} {}",
                    "Now playing:".bold().green(),
                    truncate_title(&episode_title, 60)
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.len() <= max_len {
        title.to_string()
    } else {
        format!("{}...", &title[..max_len.saturating_sub(3)])
    }
}

struct App {
    podfile_path: PathBuf,
    podfile: PodFile,
    manifest: ManifestStore,
    playlists: PlaylistStore,
    queue: QueueStore,
    client: ReqwestClient,
    reporter: SharedProgressReporter,
}

impl App {
    fn open(data_dir: PathBuf, quiet: bool) -> Result<Self> {
        let podfile_path = data_dir.join("podfile.json");
        let podfile = PodFile::load(&podfile_path).context("Failed to load podcast registry")?;

        let manifest = ManifestStore::open(&data_dir.join("manifest.db"))
            .context("Failed to open manifest store")?;
        let playlists = PlaylistStore::open(&data_dir.join("playlists.db"))
            .context("Failed to open playlist store")?;
        let queue =
            QueueStore::open(&data_dir.join("queue.db")).context("Failed to open queue store")?;

        let reporter: SharedProgressReporter = if quiet {
            NoopReporter::shared()
        } else {
            Arc::new(IndicatifReporter::new())
        };

        Ok(Self {
            podfile_path,
            podfile,
            manifest,
            playlists,
            queue,
            client: ReqwestClient::new(),
            reporter,
        })
    }

    fn save_podfile(&self) -> Result<()> {
        self.podfile
            .save(&self.podfile_path)
            .context("Failed to save podcast registry")?;
        Ok(())
    }

    async fn fetch_podcast(&self, name: &str) -> Result<podplay::Podcast> {
        let Some(rss_url) = self.podfile.feed_url(name) else {
            bail!("No such podcast: {name}");
        };
        self.reporter.report(ProgressEvent::FetchingFeed {
            url: rss_url.to_string(),
        });
        let podcast = fetch_feed(&self.client, rss_url)
            .await
            .with_context(|| format!("Failed to fetch feed for '{name}'"))?;
        self.reporter.report(ProgressEvent::FeedFetched {
            podcast_title: podcast.title.clone(),
            episode_count: podcast.episodes.len(),
        });
        Ok(podcast)
    }

    /// Download one episode and print its outcome. Failures are reported,
    /// not propagated: each episode of a batch stands alone.
    async fn download_and_report(&self, name: &str, episode: &Episode) {
        let directory = self.podfile.directory_for(name);
        let result = download_episode(
            &self.client,
            &self.manifest,
            name,
            &directory,
            episode,
            &self.reporter,
        )
        .await;

        let title = truncate_title(&episode.title, 50);
        match result {
            Ok(DownloadOutcome::Downloaded { path }) => {
                println!(
                    "{SUCCESS}{} {}",
                    title.green(),
                    path.display().to_string().dimmed()
                );
            }
            Ok(DownloadOutcome::AlreadyPresent) => {
                println!("{SKIP}{} {}", title.yellow(), "already downloaded".dimmed());
            }
            Err(e) => {
                println!("{FAILURE}{} {}", title.red(), e.to_string().dimmed());
            }
        }
    }

    async fn cmd_download(
        &self,
        name: &str,
        count: usize,
        all: bool,
        title: Option<String>,
    ) -> Result<()> {
        let podcast = self.fetch_podcast(name).await?;

        if let Some(wanted) = title {
            let Some(episode) = podcast.episodes.iter().find(|ep| ep.title == wanted) else {
                println!("{}", "Episode not found.".yellow());
                return Ok(());
            };
            self.download_and_report(name, episode).await;
            return Ok(());
        }

        let episodes: Vec<_> = if all {
            podcast.episodes.iter().collect()
        } else {
            podcast.episodes.iter().take(count).collect()
        };

        for episode in episodes {
            self.download_and_report(name, episode).await;
        }
        Ok(())
    }

    async fn cmd_search(&self, query: &str, podcast: Option<String>) -> Result<()> {
        let targets: Vec<String> = match podcast {
            Some(name) => vec![name],
            None => self.podfile.podcasts.keys().cloned().collect(),
        };

        let query = query.to_lowercase();
        let mut found = 0usize;

        for name in targets {
            match self.fetch_podcast(&name).await {
                Ok(podcast) => {
                    for ep in &podcast.episodes {
                        let matches = ep.title.to_lowercase().contains(&query)
                            || ep
                                .description
                                .as_deref()
                                .is_some_and(|d| d.to_lowercase().contains(&query));
                        if matches {
                            found += 1;
                            let date = ep
                                .pub_date
                                .map(|d| d.format("%Y-%m-%d").to_string())
                                .unwrap_or_default();
                            println!(
                                "{} {} {}",
                                name.blue(),
                                truncate_title(&ep.title, 60),
                                date.dimmed()
                            );
                        }
                    }
                }
                Err(e) => println!("{FAILURE}{} {}", name.red(), e.to_string().dimmed()),
            }
        }

        if found == 0 {
            println!("{}", "No matching episodes found.".dimmed());
        }
        Ok(())
    }

    async fn cmd_queue_download(&self) -> Result<()> {
        let entries = self.queue.list()?;
        if entries.is_empty() {
            println!("{}", "Queue is empty.".dimmed());
            return Ok(());
        }

        for (podcast, title) in entries {
            if self.podfile.feed_url(&podcast).is_none() {
                println!("{FAILURE}{} {}", title.red(), "podcast not registered".dimmed());
                continue;
            }
            match self.fetch_podcast(&podcast).await {
                Ok(feed) => match feed.episodes.iter().find(|ep| ep.title == title) {
                    Some(episode) => self.download_and_report(&podcast, episode).await,
                    None => {
                        println!("{FAILURE}{} {}", title.red(), "not found in feed".dimmed())
                    }
                },
                Err(e) => println!("{FAILURE}{} {}", title.red(), e.to_string().dimmed()),
            }
        }

        self.queue.reset()?;
        Ok(())
    }

    async fn cmd_playlist_play(&self, name: &str) -> Result<()> {
        if !self.playlists.exists(name)? {
            println!("{} {}", "No such playlist:".red(), name);
            return Ok(());
        }
        if self.playlists.get_entries(name)?.is_empty() {
            println!("{} {}", "Playlist is empty:".dimmed(), name);
            return Ok(());
        }

        let options = PlayerOptions::default();
        let outcomes =
            play_playlist(&self.manifest, &self.playlists, name, &options, &self.reporter).await?;

        if outcomes.is_empty() {
            println!("{}", "Everything already played.".dimmed());
            return Ok(());
        }

        for (entry, result) in outcomes {
            let title = truncate_title(&entry.title, 50);
            match result {
                Ok(PlaybackOutcome::Played) => {
                    println!("{SUCCESS}{} {}", "Marked as played:".green(), title)
                }
                Ok(PlaybackOutcome::Interrupted { position }) => println!(
                    "{PAUSE}{} {}",
                    format!("Saved position at {position}s for:").yellow(),
                    title
                ),
                Ok(PlaybackOutcome::Failed) => {
                    println!("{FAILURE}{} {}", "Playback failed or interrupted:".red(), title)
                }
                Ok(PlaybackOutcome::FileMissing) => {
                    println!("{SKIP}{} {}", "File missing for:".yellow(), title)
                }
                Err(PlayerError::SpawnFailed { binary, source }) => {
                    println!(
                        "{FAILURE}{} {} ({binary}: {source})",
                        "Could not start player for:".red(),
                        title
                    )
                }
                Err(e) => println!("{FAILURE}{} {}", e.to_string().red(), title),
            }
        }
        Ok(())
    }

    fn cmd_playlist(&self, command: PlaylistCommand) -> Result<Option<String>> {
        match command {
            PlaylistCommand::List => {
                let names = self.playlists.list_playlists()?;
                if names.is_empty() {
                    println!("{}", "No playlists found.".dimmed());
                } else {
                    for name in names {
                        println!("{PLAY}{name}");
                    }
                }
                Ok(None)
            }
            PlaylistCommand::Create { name } => {
                self.playlists.create(&name)?;
                println!("{} {}", "Created playlist:".green(), name);
                Ok(None)
            }
            PlaylistCommand::Delete { name } => {
                self.playlists.delete(&name)?;
                println!("{} {}", "Deleted playlist:".red(), name);
                Ok(None)
            }
            PlaylistCommand::Rename { old, new } => {
                self.playlists.rename(&old, &new)?;
                println!("{} {} → {}", "Renamed playlist:".yellow(), old, new);
                Ok(None)
            }
            PlaylistCommand::Add {
                playlist,
                podcast,
                title,
            } => {
                if !self.playlists.exists(&playlist)? {
                    println!("{} {}", "Playlist does not exist:".red(), playlist);
                    return Ok(None);
                }
                self.playlists.add_episode(&playlist, &podcast, &title)?;
                println!("{} {}", format!("Added to '{playlist}':").green(), title);
                Ok(None)
            }
            PlaylistCommand::Show { name } => {
                let entries = self.playlists.get_entries(&name)?;
                if entries.is_empty() {
                    println!("{} {}", "Playlist is empty:".dimmed(), name);
                } else {
                    println!("{}", format!("Playlist: {name}").bold().underline());
                    for entry in entries {
                        let mark = if entry.played {
                            "✓".green().to_string()
                        } else if entry.position > 0 {
                            format!("{}s", entry.position).yellow().to_string()
                        } else {
                            " ".to_string()
                        };
                        println!(
                            "  [{}] {} — {}",
                            mark,
                            entry.podcast.cyan(),
                            truncate_title(&entry.title, 70)
                        );
                    }
                }
                Ok(None)
            }
            PlaylistCommand::Play { name } => Ok(Some(name)),
        }
    }

    async fn run(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Init => {
                self.podfile = PodFile::default();
                self.save_podfile()?;
                println!("{}", "Initialized configuration.".green());
            }

            Command::Add {
                name,
                rss_url,
                directory,
            } => {
                self.podfile.add_podcast(&name, &rss_url, directory);
                self.save_podfile()?;
                println!("{} '{}'", "Added podcast".cyan(), name);
            }

            Command::Remove { name } => {
                if self.podfile.remove_podcast(&name) {
                    self.save_podfile()?;
                    println!("{} {}", "Removed podcast:".red(), name);
                } else {
                    println!("{} {}", "Podcast not found:".red(), name);
                }
            }

            Command::Rename { old, new } => {
                if self.podfile.rename_podcast(&old, &new) {
                    self.save_podfile()?;
                    println!("{} '{}' → '{}'", "Renamed".yellow(), old, new);
                } else {
                    println!("{} {}", "Podcast not found:".red(), old);
                }
            }

            Command::List => {
                if self.podfile.podcasts.is_empty() {
                    println!("{}", "No podcasts registered.".dimmed());
                }
                for (name, rss_url) in &self.podfile.podcasts {
                    let directory = self.podfile.directory_for(name);
                    println!(
                        "{HEADPHONES}{}  {}  {}",
                        name.bold(),
                        rss_url.cyan(),
                        directory.display().to_string().dimmed()
                    );
                }
            }

            Command::Download {
                name,
                count,
                all,
                title,
            } => self.cmd_download(&name, count, all, title).await?,

            Command::Search { query, podcast } => self.cmd_search(&query, podcast).await?,

            Command::Clean { name } => {
                let removed = self.manifest.clear_podcast(&name)?;
                println!(
                    "{} {} ({} records)",
                    "Cleared manifest entries for:".yellow(),
                    name,
                    removed
                );
            }

            Command::Queue(queue_command) => match queue_command {
                QueueCommand::Add { podcast, title } => {
                    self.queue.add(&podcast, &title)?;
                    println!("{} {}", "Queued:".cyan(), title);
                }
                QueueCommand::List => {
                    let entries = self.queue.list()?;
                    if entries.is_empty() {
                        println!("{}", "Queue is empty.".dimmed());
                    }
                    for (podcast, title) in entries {
                        println!("{} — {}", podcast.blue(), title);
                    }
                }
                QueueCommand::Download => self.cmd_queue_download().await?,
                QueueCommand::Remove { title } => {
                    self.queue.remove(&title)?;
                    println!("{} {}", "Removed from queue:".yellow(), title);
                }
                QueueCommand::Reset => {
                    self.queue.reset()?;
                    println!("{}", "Queue cleared.".dimmed());
                }
            },

            Command::Playlist(playlist_command) => {
                if let Some(name) = self.cmd_playlist(playlist_command)? {
                    self.cmd_playlist_play(&name).await?;
                }
            }
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("podplay")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podplay".bold().magenta(),
            "- Podcast Manager".dimmed()
        );
    }

    let data_dir = args.data_dir.unwrap_or_else(default_data_dir);
    let mut app = App::open(data_dir, args.quiet)?;
    app.run(args.command).await
}
