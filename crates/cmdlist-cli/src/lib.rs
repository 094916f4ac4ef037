//! cmdlist-cli : bibliothèque interne du binaire `cmdlist`
//!
//! But : garder la logique testable hors de `main.rs`, qui ne fait que le
//! parsing d'arguments et l'initialisation (traces, couleur).
//!
//! Points clés :
//! - Compilation **concurrente** de plusieurs sources via le service
//! - Trames écrites atomiquement (`.bin` à côté de la source avec `--auto`)
//! - Erreurs de syntaxe affichées avec la ligne fautive et un caret
//! - Inspection d'une trame : en-tête, cohérence de la durée, désassemblage

#![deny(unused_must_use)]

use std::{
    cell::RefCell,
    fmt, fs,
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
    rc::Rc,
    time::Instant,
};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cmdlist_compiler::{bytecode, disassemble, CmdListCompiler, CompilerOptions};
use cmdlist_core::frame::{split_frame, steps_to_ns};
use cmdlist_service::{CompileError, CompileService, DefaultErrorFactory, Payload, ServiceConfig, ServiceError};

#[cfg(feature = "color")]
use owo_colors::{OwoColorize, Stream};

/// Extension des trames écrites avec `--auto`.
pub const FRAME_EXT: &str = "bin";

// ───────────────────────────── Types publics ─────────────────────────────

/// Commande haut-niveau (sans parsing CLI, réservé à main.rs).
#[derive(Clone, Debug)]
pub enum Command {
    /// Compile des sources vers des trames.
    Compile(CompileTask),
    /// Compile sans rien écrire.
    Check(CheckTask),
    /// Décode une trame.
    Inspect(InspectTask),
}

#[derive(Clone, Debug, Default)]
pub struct CompileTask {
    pub inputs: Vec<Input>, // vide = stdin
    pub output: Output,     // chemin, stdout ou auto (même dossier, .bin)
    pub auto_mkdir: bool,   // crée les dossiers parents si besoin
    pub overwrite: bool,    // autorise l'écrasement
    pub time: bool,         // afficher le timing
}

#[derive(Clone, Debug, Default)]
pub struct CheckTask {
    pub inputs: Vec<Input>,
}

#[derive(Clone, Debug, Default)]
pub struct InspectTask {
    pub input: Input,
    pub disasm: bool,
    pub json: bool,
}

/// Entrée : fichier ou `-` (=stdin).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Input {
    Path(PathBuf),
    #[default]
    Stdin,
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Stdin => f.write_str("<stdin>"),
        }
    }
}

/// Sortie d'une compilation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Output {
    Path(PathBuf),
    #[default]
    Stdout,
    Auto, // même nom + .bin
}

/// Réglages, chargés depuis `--config <file.json>`.
///
/// ```json
/// { "compiler": { "dds_channels": 8 }, "service": { "workers": 4 } }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub compiler: CompilerOptions,
    pub service: ServiceConfig,
}

impl Settings {
    /// Lit un fichier JSON ; les champs absents gardent leur valeur par défaut.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config {}", display(path)))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", display(path)))
    }
}

/// Issue de la compilation d'une entrée.
#[derive(Debug)]
pub struct Report {
    pub input: Input,
    pub result: Result<Payload, CompileError>,
}

// ───────────────────────────── Initialisation ─────────────────────────────

/// Installe le subscriber `tracing` sur stderr. `RUST_LOG` a priorité sur
/// `default_level`.
pub fn init_logger(default_level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .try_init();
}

// ───────────────────────────── Exécution ─────────────────────────────

/// Exécute une commande. Retourne un code de sortie.
pub fn execute(cmd: Command, settings: &Settings) -> Result<i32> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let code = match cmd {
        Command::Compile(t) => compile_entry(t, settings, &mut out)?,
        Command::Check(t) => check_entry(&t, settings)?,
        Command::Inspect(t) => {
            inspect_entry(&t, &mut out)?;
            0
        },
    };
    out.flush()?;
    Ok(code)
}

/// `compile` : écrit une trame par source réussie, 1 si une source échoue.
pub fn compile_entry(task: CompileTask, settings: &Settings, out: &mut dyn Write) -> Result<i32> {
    let CompileTask { inputs, output, auto_mkdir, overwrite, time } = task;
    let inputs = if inputs.is_empty() { vec![Input::Stdin] } else { inputs };
    if inputs.len() > 1 && output != Output::Auto {
        bail!("{} inputs given: use --auto to write one frame next to each source", inputs.len());
    }

    let targets: Vec<Option<PathBuf>> = inputs.iter().map(|i| output_path(&output, i)).collect();
    for path in targets.iter().flatten() {
        if path.exists() && !overwrite {
            bail!("output file already exists: {} (use --overwrite)", display(path));
        }
    }

    let start = Instant::now();
    let reports = compile_all(&inputs, settings)?;
    let elapsed = start.elapsed();

    let mut failed = 0usize;
    for (report, target) in reports.into_iter().zip(targets) {
        let payload = match report.result {
            Ok(payload) => payload,
            Err(e) => {
                failed += 1;
                status_err("ERROR", &format_failure(&report.input, &e));
                continue;
            },
        };
        let Some(path) = target else {
            out.write_all(payload.as_bytes())?;
            continue;
        };
        if auto_mkdir {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }
        write_bytes_atomic(&path, payload.as_bytes()).with_context(|| format!("writing {}", display(&path)))?;
        status_ok(
            "COMPILE",
            &format!("{} -> {} ({} ns)", report.input, display(&path), payload.header().duration_ns),
        );
    }

    if time {
        status_info("TIME", &format!("compile: {} ms for {} input(s)", elapsed.as_millis(), inputs.len()));
    }
    Ok(i32::from(failed > 0))
}

/// `check` : comme `compile`, sans rien écrire.
pub fn check_entry(task: &CheckTask, settings: &Settings) -> Result<i32> {
    let inputs = if task.inputs.is_empty() { vec![Input::Stdin] } else { task.inputs.clone() };
    let mut failed = 0usize;
    for report in compile_all(&inputs, settings)? {
        match &report.result {
            Ok(p) => status_ok(
                "OK",
                &format!("{} ({} code bytes, {} ns)", report.input, p.code().len(), p.header().duration_ns),
            ),
            Err(e) => {
                failed += 1;
                status_err("ERROR", &format_failure(&report.input, e));
            },
        }
    }
    Ok(i32::from(failed > 0))
}

/// `inspect` : décrit une trame.
pub fn inspect_entry(task: &InspectTask, out: &mut dyn Write) -> Result<()> {
    let bytes = read_bytes(&task.input)?;
    let text = describe_frame(&bytes, task.disasm, task.json).with_context(|| format!("inspecting {}", task.input))?;
    out.write_all(text.as_bytes())?;
    Ok(())
}

/// Compile toutes les entrées en parallèle ; les rapports suivent l'ordre
/// des entrées.
pub fn compile_all(inputs: &[Input], settings: &Settings) -> Result<Vec<Report>> {
    let sources = inputs.iter().map(read_source).collect::<Result<Vec<_>>>()?;
    let mut svc = CompileService::new(CmdListCompiler::new(settings.compiler), &settings.service)
        .context("starting compile workers")?;

    let slots: Rc<RefCell<Vec<Option<Result<Payload, CompileError>>>>> =
        Rc::new(RefCell::new(inputs.iter().map(|_| None).collect()));

    for (i, source) in sources.into_iter().enumerate() {
        let id = loop {
            let slot = Rc::clone(&slots);
            match svc.compile(source.clone(), DefaultErrorFactory, move |res| slot.borrow_mut()[i] = Some(res)) {
                // file bornée : on libère une place avant de réessayer
                Err(ServiceError::QueueFull(_)) if svc.wait_one().is_some() => {},
                other => break other.context("submitting compile job")?,
            }
        };
        debug!(job = %id, input = %inputs[i], "submitted");
    }

    let dispatched = svc.run_until_idle();
    svc.shutdown();
    info!(inputs = inputs.len(), dispatched, "compilation finished");

    let results = std::mem::take(&mut *slots.borrow_mut());
    inputs
        .iter()
        .cloned()
        .zip(results)
        .map(|(input, result)| {
            let result = result.ok_or_else(|| anyhow!("no result for {input}"))?;
            Ok(Report { input, result })
        })
        .collect()
}

/// Texte affiché pour un échec : position puis vue caret pour une erreur de
/// syntaxe, message seul sinon.
pub fn format_failure(input: &Input, err: &CompileError) -> String {
    match err {
        CompileError::Syntax(e) => format!("{input}:{}:{}\n{}", e.lineno, e.colnum, e.render()),
        CompileError::Generic(msg) => format!("{input}: {msg}"),
    }
}

/// En-tête, pas recalculés depuis le code et, au choix, désassemblage.
pub fn describe_frame(frame: &[u8], disasm: bool, json: bool) -> Result<String> {
    let (header, code) = split_frame(frame).context("decoding frame header")?;
    let steps = bytecode::total_steps(code).context("decoding frame code")?;
    let computed_ns = steps_to_ns(steps);
    if computed_ns != header.duration_ns {
        warn!(header_ns = header.duration_ns, computed_ns, "frame duration does not match its code");
    }

    if json {
        let mut v = serde_json::json!({
            "duration_ns": header.duration_ns,
            "ttl_mask": header.ttl_mask,
            "code_len": code.len(),
            "steps": steps,
            "consistent": computed_ns == header.duration_ns,
        });
        if disasm {
            v["disasm"] = disassemble(code)?.into();
        }
        return Ok(serde_json::to_string_pretty(&v)? + "\n");
    }

    let mut s = format!(
        "duration : {} ns\nsteps    : {steps}\nttl mask : {:#010x}\ncode     : {} bytes\n",
        header.duration_ns,
        header.ttl_mask,
        code.len()
    );
    if computed_ns != header.duration_ns {
        s.push_str(&format!("warning  : code runs for {computed_ns} ns\n"));
    }
    if disasm {
        s.push('\n');
        s.push_str(&disassemble(code)?);
    }
    Ok(s)
}

// ───────────────────────────── Utilitaires E/S ─────────────────────────────

fn read_source(input: &Input) -> Result<String> {
    match input {
        Input::Stdin => {
            let mut s = String::new();
            io::stdin().read_to_string(&mut s)?;
            Ok(s)
        },
        Input::Path(p) => {
            let f = File::open(p).with_context(|| format!("opening {}", display(p)))?;
            let mut r = BufReader::new(f);
            let mut s = String::new();
            r.read_to_string(&mut s).with_context(|| format!("reading {}", display(p)))?;
            Ok(s)
        },
    }
}

fn read_bytes(input: &Input) -> Result<Vec<u8>> {
    match input {
        Input::Stdin => {
            let mut b = Vec::new();
            io::stdin().read_to_end(&mut b)?;
            Ok(b)
        },
        Input::Path(p) => fs::read(p).with_context(|| format!("reading frame {}", display(p))),
    }
}

fn output_path(output: &Output, input: &Input) -> Option<PathBuf> {
    match (output, input) {
        (Output::Auto, Input::Path(p)) => Some(default_frame_path(p)),
        (Output::Auto, Input::Stdin) => Some(PathBuf::from(format!("out.{FRAME_EXT}"))),
        (Output::Path(p), _) => Some(p.clone()),
        (Output::Stdout, _) => None,
    }
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| anyhow!("output path has no parent: {}", display(path)))?;
    let tmp = unique_tmp_path(parent, path.file_name().unwrap_or_default());
    {
        let mut w = BufWriter::new(File::create(&tmp)?);
        w.write_all(bytes)?;
        w.flush()?;
    }
    if path.exists() {
        // Windows : rename sur cible existante peut échouer
        let _ = fs::remove_file(path);
    }
    fs::rename(&tmp, path).or_else(|_| fs::copy(&tmp, path).and_then(|_| fs::remove_file(&tmp)))?;
    Ok(())
}

fn unique_tmp_path(dir: &Path, base: &std::ffi::OsStr) -> PathBuf {
    let mut i = 0u32;
    loop {
        let candidate = dir.join(format!("{}.tmp{}", base.to_string_lossy(), i));
        if !candidate.exists() {
            return candidate;
        }
        i = i.wrapping_add(1);
    }
}

fn default_frame_path(src: &Path) -> PathBuf { src.with_extension(FRAME_EXT) }

fn display(p: &Path) -> String { p.to_string_lossy().to_string() }

// ───────────────────────────── Sorties jolies ─────────────────────────────

fn status_ok(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    {
        eprintln!("{} {}", tag.if_supports_color(Stream::Stderr, |t| t.green()), msg);
    }
    #[cfg(not(feature = "color"))]
    {
        eprintln!("{} {}", tag, msg);
    }
}

fn status_info(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    {
        eprintln!("{} {}", tag.if_supports_color(Stream::Stderr, |t| t.blue()), msg);
    }
    #[cfg(not(feature = "color"))]
    {
        eprintln!("{} {}", tag, msg);
    }
}

fn status_err(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    {
        eprintln!("{} {}", tag.if_supports_color(Stream::Stderr, |t| t.red()), msg);
    }
    #[cfg(not(feature = "color"))]
    {
        eprintln!("{} {}", tag, msg);
    }
}

// ───────────────────────────── Tests ─────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_paths() {
        let out = default_frame_path(Path::new("seq/startup.cmd"));
        assert_eq!(out, PathBuf::from("seq/startup.bin"));
        assert_eq!(output_path(&Output::Auto, &Input::Stdin), Some(PathBuf::from("out.bin")));
        assert_eq!(output_path(&Output::Stdout, &Input::Path("a".into())), None);
    }

    #[test]
    fn describe_empty_frame() {
        let text = describe_frame(&[0u8; 12], false, false).unwrap();
        assert_eq!(text, "duration : 0 ns\nsteps    : 0\nttl mask : 0x00000000\ncode     : 0 bytes\n");
    }

    #[test]
    fn describe_flags_inconsistent_duration() {
        let mut frame = 5u64.to_le_bytes().to_vec();
        frame.extend_from_slice(&0u32.to_le_bytes());
        let text = describe_frame(&frame, false, false).unwrap();
        assert!(text.ends_with("warning  : code runs for 0 ns\n"), "{text}");
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let err = describe_frame(&[1, 2, 3], false, false).unwrap_err();
        assert!(format!("{err:#}").starts_with("decoding frame header"), "{err:#}");
    }

    #[test]
    fn generic_failure_text() {
        let e = CompileError::Generic("compilation cancelled".into());
        assert_eq!(format_failure(&Input::Stdin, &e), "<stdin>: compilation cancelled");
    }
}
