// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use keyclack::config::Settings;
use keyclack::sounds::{list_packs, SoundPack};
use keyclack::{audio, input, Engine};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=keyboard sounds

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/keyclack
ExecStart=/usr/local/bin/keyclack start --config "$KEYCLACK_CONFIG"

[Install]
WantedBy=multi-user.target
Alias=keyclack.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Mechanical keyboard sounds for every key press."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plays key sounds until interrupted.
    Start {
        /// The path to the settings file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The sound pack directory. Overrides the settings file.
        #[arg(short, long)]
        pack: Option<PathBuf>,
        /// The keystroke source. "mock" listens to nothing.
        #[arg(long, default_value = "evdev")]
        input: String,
    },
    /// Lists the sound packs in the given directory.
    Packs {
        /// The directory holding sound packs.
        path: PathBuf,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            config,
            pack,
            input,
        } => {
            let mut settings = Settings::load(config.as_deref())?;
            if let Some(pack) = pack {
                settings.set_sound_pack(pack);
            }
            let pack_path = settings
                .sound_pack()
                .ok_or("no sound pack configured, use --pack or set sound_pack")?;

            let resolver = Arc::new(SoundPack::open(pack_path)?);
            let backend = audio::get_backend(settings.audio_device())?;
            let source = input::get_source(&input)?;
            let engine = Engine::new(settings.engine_settings()?, backend, resolver, source);

            engine.start()?;
            tokio::signal::ctrl_c().await?;
            info!("Interrupted, stopping");
            engine.stop();
        }
        Commands::Packs { path } => {
            let packs = list_packs(&path)?;

            if packs.is_empty() {
                println!("No sound packs found in {}.", path.display());
                return Ok(());
            }

            println!("Sound packs (count: {}):", packs.len());
            for pack in packs {
                println!("- {}", pack.display());
            }
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}
