use clap::{Parser, Subcommand};
use derivative::Derivative;
use i18n_embed::DesktopLanguageRequester;
use log::*;
#[cfg(debug_assertions)]
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::{
    append::rolling_file::{
        RollingFileAppender,
        policy::compound::{
            CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
        },
    },
    config::{Appender, Config as LogConfig, Logger, Root},
    encode::pattern::PatternEncoder,
};
use serde::{Deserialize, Serialize};
use soundbeats_card::{
    ActionDispatcher, SoundbeatsCard, UserAction,
    actions::MediaCommand,
    home_assistant::{RestTransport, SnapshotSubscription, snapshot_from_states_json},
    i18n::Language,
};
use soundbeats_common::{
    config::{CardConfig, Surface},
    view_model::{ViewModel, team_id},
};
use std::{error::Error, fs, path::PathBuf, time::Duration};
use tokio::{signal, task};

const APP_NAME: &str = "soundbeats-card";

#[derive(Derivative, Serialize, Deserialize, Debug, Clone)]
#[derivative(Default)]
pub struct AppConfig {
    #[derivative(Default(value = "String::from(\"http://homeassistant.local:8123\")"))]
    home_assistant_url: String,
    access_token: String,
    admin: bool,
    surface: Surface,
    #[derivative(Default(value = "PathBuf::from(\"soundbeats-card.html\")"))]
    output_path: PathBuf,
    #[derivative(Default(value = "10"))]
    request_timeout_secs: u64,
    /// Falls back to the desktop's language when unset
    language: Option<Language>,
}

impl AppConfig {
    fn language(&self) -> Language {
        self.language.unwrap_or_else(|| {
            DesktopLanguageRequester::requested_languages()
                .first()
                .map(Language::from_lang_id)
                .unwrap_or_default()
        })
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(long, short, action(clap::ArgAction::Count))]
    /// Increase the log verbosity
    verbose: u8,

    #[clap(long)]
    /// Directory within which log files will be placed, default is platform dependent
    log_location: Option<PathBuf>,

    #[clap(long, default_value = "5000000")]
    /// Max size in bytes that a log file is allowed to reach before being rolled over
    log_max_file_size: u64,

    #[clap(long, default_value = "3")]
    /// Number of archived logs to keep
    num_old_logs: u32,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow Home Assistant and keep the rendered HTML file up to date
    Watch,
    /// Render once and print the HTML
    Render {
        #[clap(long)]
        /// A saved `/api/states` response to render instead of fetching one
        snapshot: Option<PathBuf>,
    },
    /// Send a single action
    Call {
        #[clap(subcommand)]
        action: CallCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CallCommand {
    StartGame,
    NextSong,
    TeamName { team: usize, name: String },
    TeamPoints { team: usize, points: String },
    Participating {
        team: usize,
        #[clap(action = clap::ArgAction::Set)]
        participating: bool,
    },
    YearGuess { team: usize, year_guess: i64 },
    Betting {
        team: usize,
        #[clap(action = clap::ArgAction::Set)]
        betting: bool,
    },
    TimerLength { timer_length: String },
    AudioPlayer { entity_id: String },
    TeamCount { team_count: String },
    /// Leave out `user_id` to clear the assignment
    TeamUser {
        team: usize,
        user_id: Option<String>,
    },
    VolumeUp,
    VolumeDown,
    PlayPause,
}

impl CallCommand {
    /// `selected_player` is only consulted for media commands
    fn into_action(self, selected_player: Option<&str>) -> Option<UserAction> {
        match self {
            Self::StartGame => Some(UserAction::StartGame),
            Self::NextSong => Some(UserAction::NextSong),
            Self::TeamName { team, name } => UserAction::team_name(&team_id(team), &name),
            Self::TeamPoints { team, points } => UserAction::team_points(&team_id(team), &points),
            Self::Participating {
                team,
                participating,
            } => Some(UserAction::UpdateTeamParticipating {
                team_id: team_id(team),
                participating,
            }),
            Self::YearGuess { team, year_guess } => Some(UserAction::UpdateTeamYearGuess {
                team_id: team_id(team),
                year_guess,
            }),
            Self::Betting { team, betting } => Some(UserAction::UpdateTeamBetting {
                team_id: team_id(team),
                betting,
            }),
            Self::TimerLength { timer_length } => UserAction::timer_length(&timer_length),
            Self::AudioPlayer { entity_id } => UserAction::audio_player(&entity_id),
            Self::TeamCount { team_count } => UserAction::team_count(&team_count),
            Self::TeamUser { team, user_id } => Some(UserAction::team_user(
                &team_id(team),
                user_id.as_deref().unwrap_or_default(),
            )),
            Self::VolumeUp => UserAction::media(MediaCommand::VolumeUp, selected_player),
            Self::VolumeDown => UserAction::media(MediaCommand::VolumeDown, selected_player),
            Self::PlayPause => UserAction::media(MediaCommand::PlayPause, selected_player),
        }
    }

    fn needs_player(&self) -> bool {
        matches!(self, Self::VolumeUp | Self::VolumeDown | Self::PlayPause)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    init_logging(&args)?;

    let config: AppConfig = match confy::load(APP_NAME, None) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to read config file, overwriting with default. Error: {e}");
            let config = AppConfig::default();
            confy::store(APP_NAME, None, &config)?;
            config
        }
    };
    info!("Using Home Assistant at {}", config.home_assistant_url);

    let transport = RestTransport::new(
        &config.home_assistant_url,
        &config.access_token,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    let card_config = CardConfig {
        admin: config.admin,
    };
    let language = config.language();
    debug!("Rendering in {language:?}");

    match args.command {
        Command::Watch => {
            let mut card = SoundbeatsCard::new(Some(card_config), config.surface)?;
            card.set_language(language);
            let mut subscription =
                SnapshotSubscription::connect(&config.home_assistant_url, &config.access_token)
                    .await?;
            card.set_users(subscription.users().to_vec());
            card.set_current_user(subscription.current_user().map(str::to_string));
            let mut snapshot = subscription.current();
            loop {
                card.set_snapshot(&snapshot);
                // Focus restores run once the update has returned to the scheduler
                task::yield_now().await;
                card.run_deferred();
                if let Some(html) = card.html() {
                    fs::write(&config.output_path, html)?;
                }

                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Stopping");
                        break;
                    }
                    next = subscription.changed() => snapshot = next?,
                }
            }
            subscription.unsubscribe().await;
        }
        Command::Render { snapshot } => {
            let snapshot = match snapshot {
                Some(path) => snapshot_from_states_json(&fs::read_to_string(path)?)?,
                None => transport.fetch_states().await?,
            };
            let mut card = SoundbeatsCard::new(Some(card_config), config.surface)?;
            card.set_language(language);
            card.set_snapshot(&snapshot);
            if let Some(html) = card.html() {
                println!("{html}");
            }
        }
        Command::Call { action } => {
            let selected_player = if action.needs_player() {
                let snapshot = transport.fetch_states().await?;
                ViewModel::read(&snapshot, config.surface)
                    .settings
                    .selected_audio_player
            } else {
                None
            };
            let Some(action) = action.into_action(selected_player.as_deref()) else {
                warn!("Nothing to send");
                return Ok(());
            };
            let dispatcher = ActionDispatcher::new(transport);
            dispatcher.dispatch(&action)?;
            dispatcher.shutdown().await;
        }
    }

    Ok(())
}

fn init_logging(args: &Cli) -> Result<(), Box<dyn Error>> {
    let log_level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let log_base_path = match &args.log_location {
        Some(path) => path.clone(),
        None => {
            let mut path = directories::BaseDirs::new()
                .ok_or("Could not find a directory to store logs")?
                .data_local_dir()
                .to_path_buf();
            path.push("soundbeats-card-logs");
            path
        }
    };
    let mut log_path = log_base_path.clone();
    let mut archived_log_path = log_base_path.clone();
    log_path.push(format!("{APP_NAME}-log.txt"));
    archived_log_path.push(format!("{APP_NAME}-log-{{}}.txt.gz"));

    #[cfg(debug_assertions)]
    eprintln!("Log path: {}", log_path.display());

    // Only log to the console in debug mode
    #[cfg(all(debug_assertions, not(target_os = "windows")))]
    let console_target = Target::Stderr;
    #[cfg(all(debug_assertions, target_os = "windows"))]
    let console_target = Target::Stdout; // Windows apps don't get a stderr handle
    #[cfg(debug_assertions)]
    let console = ConsoleAppender::builder()
        .target(console_target)
        .encoder(Box::new(PatternEncoder::new("[{d} {h({l:5})} {M}] {m}{n}")))
        .build();

    let roller = FixedWindowRoller::builder().build(
        archived_log_path
            .as_os_str()
            .to_str()
            .ok_or("Log path is not valid UTF-8")?,
        args.num_old_logs,
    )?;
    let file_policy = CompoundPolicy::new(
        Box::new(SizeTrigger::new(args.log_max_file_size)),
        Box::new(roller),
    );
    let file_appender = RollingFileAppender::builder()
        .append(true)
        .encoder(Box::new(PatternEncoder::new("[{d} {l:5} {M}] {m}{n}")))
        .build(log_path, Box::new(file_policy))?;

    // Everything else only logs errors
    let root = Root::builder().appender("file_appender");
    #[cfg(debug_assertions)]
    let root = root.appender("console");
    let root = root.build(LevelFilter::Error);

    let log_config = LogConfig::builder()
        .appender(Appender::builder().build("file_appender", Box::new(file_appender)));

    #[cfg(debug_assertions)]
    let log_config = log_config.appender(Appender::builder().build("console", Box::new(console)));

    let log_config = log_config
        .logger(Logger::builder().build("soundbeats_card", log_level))
        .logger(Logger::builder().build("soundbeats_common", log_level))
        .build(root)?;

    log4rs::init_config(log_config)?;
    log_panics::init();
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.home_assistant_url, "http://homeassistant.local:8123");
        assert_eq!(config.surface, Surface::Card);
        assert!(!config.admin);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.language, None);
    }

    #[test]
    fn test_app_config_round_trip() {
        let config = AppConfig {
            admin: true,
            surface: Surface::Panel,
            language: Some(Language::German),
            ..Default::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains(r#"surface = "panel""#));
        assert!(text.contains(r#"language = "de""#));
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert!(parsed.admin);
        assert_eq!(parsed.surface, Surface::Panel);
        assert_eq!(parsed.language(), Language::German);
        assert_eq!(parsed.output_path, config.output_path);
    }

    #[test]
    fn test_call_commands() {
        assert_eq!(
            CallCommand::TeamName {
                team: 2,
                name: " Rockers ".to_string()
            }
            .into_action(None),
            Some(UserAction::UpdateTeamName {
                team_id: "team_2".to_string(),
                name: "Rockers".to_string()
            })
        );
        assert_eq!(CallCommand::VolumeUp.into_action(None), None);
        assert_eq!(
            CallCommand::PlayPause.into_action(Some("media_player.den")),
            Some(UserAction::Media {
                command: MediaCommand::PlayPause,
                entity_id: "media_player.den".to_string()
            })
        );
        assert!(!CallCommand::StartGame.needs_player());

        assert_eq!(
            CallCommand::TeamUser {
                team: 4,
                user_id: None
            }
            .into_action(None),
            Some(UserAction::UpdateTeamUser {
                team_id: "team_4".to_string(),
                user_id: None
            })
        );
        let cli = Cli::parse_from(["soundbeats-card", "call", "team-user", "1", "8f2c"]);
        assert!(matches!(
            cli.command,
            Command::Call {
                action: CallCommand::TeamUser {
                    team: 1,
                    user_id: Some(_)
                }
            }
        ));
    }

    #[test]
    fn test_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
        let cli = Cli::parse_from(["soundbeats-card", "-vv", "call", "team-points", "3", "15"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Command::Call {
                action: CallCommand::TeamPoints { team: 3, .. }
            }
        ));
    }
}
