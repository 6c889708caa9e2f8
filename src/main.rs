use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tracing::{info, warn};

use kazeta_savestates::{
    Config, Game, Library, ProfileRegistry, SaveEntry, SaveSession, SaveStateIndex, Slot,
};

#[derive(Parser)]
#[command(name = "kazeta-savestates", version, about = "Save state bookkeeping for Kazeta+ emulator launches")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GameArgs {
    /// ROM file of the game
    rom: PathBuf,
    /// Library (system) the game belongs to, e.g. "snes"
    #[arg(long)]
    library: String,
    /// Emulator the game is launched with
    #[arg(long, default_value = "libretro")]
    emulator: String,
    /// Other emulators configured for the library
    #[arg(long = "also-emulator")]
    other_emulators: Vec<String>,
    /// Content hash of the ROM, for renamed saves
    #[arg(long)]
    hash: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the save states of a game
    List {
        #[command(flatten)]
        game: GameArgs,
    },
    /// Delete a save slot and its screenshot
    Delete {
        #[command(flatten)]
        game: GameArgs,
        #[arg(long)]
        slot: Slot,
    },
    /// Copy (or move) a save slot to another slot
    Copy {
        #[command(flatten)]
        game: GameArgs,
        #[arg(long)]
        slot: Slot,
        #[arg(long)]
        to: Slot,
        #[arg(long = "move")]
        move_file: bool,
    },
    /// Run an emulator with save state arguments appended
    Run {
        #[command(flatten)]
        game: GameArgs,
        /// Slot to start from: a number, "auto", "new" or "none"
        #[arg(long, default_value = "none")]
        slot: Slot,
        /// Emulator command line
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

fn open_index(args: &GameArgs, config: &Config) -> (Game, SaveStateIndex) {
    let mut emulators = vec![args.emulator.clone()];
    emulators.extend(args.other_emulators.iter().cloned());

    let library = Library {
        name: args.library.clone(),
        emulators,
        saves_root: config.saves_path.clone(),
    };
    let registry = Arc::new(ProfileRegistry::from_config(config));
    let index = SaveStateIndex::new(library, registry);

    let mut game = Game::new(&args.rom, &args.library, &args.emulator);
    game.hash = args.hash.clone();
    (game, index)
}

fn find_entry(index: &SaveStateIndex, game: &Game, slot: Slot) -> Result<SaveEntry> {
    match index.get_save_states(game, None).into_iter().find(|e| e.slot == slot) {
        Some(entry) => Ok(entry),
        None => bail!("{} has no save in slot {}", game.stem(), slot),
    }
}

fn list(game: &Game, index: &SaveStateIndex) {
    let mut states = index.get_save_states(game, None);
    states.sort_by_key(|e| e.slot.index());

    if states.is_empty() {
        println!("No save states for {}", game.stem());
        return;
    }

    for entry in states {
        let modified = entry
            .modified
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let emulator = entry.profile.as_ref().map(|p| p.name.as_str()).unwrap_or("-");
        println!("{:<10} {:<19} {:<10} {}", entry.label(), modified, emulator, entry.file_name());
    }
}

fn run(game: &Game, index: &mut SaveStateIndex, config: &Config, slot: Slot, command: &[String]) -> Result<i32> {
    let request = match slot {
        Slot::Unset => SaveEntry::request(Slot::Unset),
        Slot::Autosave => index
            .default_autosave()
            .cloned()
            .unwrap_or_else(|| SaveEntry::request(Slot::Autosave)),
        Slot::ForceNewGame => index.default_new_game().clone(),
        Slot::Numbered(_) => find_entry(index, game, slot)?,
    };

    let mut session = SaveSession::new(request);
    let fragment = session.build_launch_command(game, index, config);
    let extra = shell_words::split(&fragment).context("Invalid save state arguments")?;

    let (program, args) = match command.split_first() {
        Some(split) => split,
        None => bail!("No emulator command given"),
    };

    info!("Launching {} {} {}", program, args.join(" "), fragment);
    let status = Command::new(program)
        .args(args)
        .args(&extra)
        .status();

    // Reconcile even if the emulator could not be started
    session.on_session_end(game, index, config);

    let status = status.with_context(|| format!("Failed to start {}", program))?;
    if !status.success() {
        warn!("{} exited with {}", program, status);
    }
    Ok(status.code().unwrap_or(1))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Commands::List { game } => {
            let (game, index) = open_index(&game, &config);
            list(&game, &index);
        }
        Commands::Delete { game, slot } => {
            let (game, index) = open_index(&game, &config);
            find_entry(&index, &game, slot)?.remove()?;
            info!("Deleted slot {} of {}", slot, game.stem());
        }
        Commands::Copy { game, slot, to, move_file } => {
            let (game, index) = open_index(&game, &config);
            find_entry(&index, &game, slot)?.copy_to_slot(to, move_file)?;
            info!("{} slot {} of {} to slot {}", if move_file { "Moved" } else { "Copied" }, slot, game.stem(), to);
        }
        Commands::Run { game, slot, command } => {
            let (game, mut index) = open_index(&game, &config);
            let code = run(&game, &mut index, &config, slot, &command)?;
            std::process::exit(code);
        }
    }

    Ok(())
}
