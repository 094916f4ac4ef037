//! `cmdlist` : CLI des listes de commandes
//!
//! Ici on fait uniquement : parsing d'arguments, initialisation (traces,
//! couleur, réglages), et délégation à `cmdlist_cli` (lib).

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use cmdlist_cli as cli;
use cmdlist_service::ServiceConfig;

// ──────────────────────────── CLI (clap) ────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "cmdlist", version, about = "Compile, check and inspect command lists", long_about = None)]
struct Opt {
    /// Augmente la verbosité (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux (erreurs seulement)
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue, global = true)]
    quiet: bool,

    /// Couleur des statuts
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto, global = true)]
    color: ColorChoice,

    /// Nombre de threads de compilation (sinon config, `CMDLIST_WORKERS`, ou nb de cœurs)
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Réglages JSON (canaux, pool)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Sous-commandes
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compiler des sources vers des trames (durée + masque TTL + code)
    Compile {
        /// Fichiers source (ou - pour stdin)
        inputs: Vec<PathBuf>,
        /// Fichier de sortie (stdout si omis et pas --auto)
        #[arg(short, long, conflicts_with = "auto")]
        output: Option<PathBuf>,
        /// Sortie auto : même nom + .bin
        #[arg(long)]
        auto: bool,
        /// Créer les dossiers parents si nécessaire
        #[arg(long = "mkdir")]
        auto_mkdir: bool,
        /// Écraser les fichiers de sortie
        #[arg(long)]
        overwrite: bool,
        /// Afficher le temps de compilation
        #[arg(long)]
        time: bool,
    },

    /// Compiler sans rien écrire
    Check {
        /// Fichiers source (ou - pour stdin)
        inputs: Vec<PathBuf>,
    },

    /// Décoder une trame
    Inspect {
        /// Trame (ou - pour stdin)
        input: PathBuf,
        /// Désassembler le code
        #[arg(long)]
        disasm: bool,
        /// Sortie JSON
        #[arg(long)]
        json: bool,
    },
}

// ──────────────────────────── Entrée / Sortie ────────────────────────────

fn input_from_path(p: PathBuf) -> cli::Input {
    if p.as_os_str() == "-" { cli::Input::Stdin } else { cli::Input::Path(p) }
}

fn output_from_opt(output: Option<PathBuf>, auto: bool) -> cli::Output {
    match (output, auto) {
        (_, true) => cli::Output::Auto,
        (Some(p), false) => cli::Output::Path(p),
        (None, false) => cli::Output::Stdout,
    }
}

// ──────────────────────────── Traces / Couleur ────────────────────────────

const fn default_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_color(choice: ColorChoice) {
    #[cfg(feature = "color")]
    {
        match choice {
            ColorChoice::Auto => owo_colors::unset_override(),
            ColorChoice::Always => owo_colors::set_override(true),
            ColorChoice::Never => owo_colors::set_override(false),
        }
    }
    #[cfg(not(feature = "color"))]
    {
        let _ = choice;
    }
}

fn load_settings(config: Option<&PathBuf>, workers: Option<usize>) -> Result<cli::Settings> {
    let mut settings = match config {
        Some(path) => cli::Settings::load(path)?,
        None => cli::Settings { service: ServiceConfig::from_env(), ..cli::Settings::default() },
    };
    if let Some(n) = workers {
        settings.service.workers = n;
    }
    Ok(settings)
}

// ──────────────────────────── main ────────────────────────────

fn main() -> ExitCode {
    match real_main() {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        },
    }
}

fn real_main() -> Result<i32> {
    let opt = Opt::parse();

    init_color(opt.color);
    cli::init_logger(default_level(opt.verbose, opt.quiet));

    let settings = load_settings(opt.config.as_ref(), opt.workers)?;
    tracing::debug!(?settings, "settings loaded");

    let command = match opt.cmd {
        Command::Compile { inputs, output, auto, auto_mkdir, overwrite, time } => {
            cli::Command::Compile(cli::CompileTask {
                inputs: inputs.into_iter().map(input_from_path).collect(),
                output: output_from_opt(output, auto),
                auto_mkdir,
                overwrite,
                time,
            })
        },
        Command::Check { inputs } => {
            cli::Command::Check(cli::CheckTask { inputs: inputs.into_iter().map(input_from_path).collect() })
        },
        Command::Inspect { input, disasm, json } => {
            cli::Command::Inspect(cli::InspectTask { input: input_from_path(input), disasm, json })
        },
    };

    cli::execute(command, &settings).context("command failed")
}
