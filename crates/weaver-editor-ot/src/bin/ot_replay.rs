//! Replay a scripted editing session through an `OtBridge`.
//!
//! A script is a JSON file:
//!
//! ```json
//! {
//!   "document": "notes",
//!   "options": { "tracked_field": "content" },
//!   "initial": { "content": "hello" },
//!   "steps": [
//!     { "local": [{ "from": [0, 5], "text": "!" }] },
//!     { "remote": [{ "p": ["content"], "t": "text0", "o": [{ "p": 0, "i": ">" }] }] },
//!     "flush",
//!     "audit"
//!   ]
//! }
//! ```
//!
//! Without `initial` the document starts out missing and the bridge creates it.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;
use miette::{Context, IntoDiagnostic, Result};
use serde::Deserialize;
use serde_json::Value;
use weaver_editor_ot::{
    BridgeError, BridgeOptions, EditorSurface, MemoryDocument, Operation, OtBridge,
    OtDocumentClient, Position, RopeSurface,
};

#[derive(Parser)]
#[command(version, about = "Replay an editing script through the editor/OT bridge", long_about = None)]
struct Cli {
    /// Path to the JSON script
    script: PathBuf,

    /// Log every translated operation
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Deserialize)]
struct Script {
    #[serde(default = "default_document")]
    document: String,
    #[serde(default)]
    options: BridgeOptions,
    initial: Option<Value>,
    steps: Vec<Step>,
}

fn default_document() -> String {
    "script".to_owned()
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum Step {
    /// Edits made by the user, applied as one editor transaction.
    Local(Vec<Edit>),
    /// An operation from another client.
    Remote(Operation),
    /// Deliver pending acknowledgments.
    Flush,
    Audit,
    Detach,
    Attach,
    /// Another client deletes the document.
    Delete,
}

#[derive(Deserialize)]
struct Edit {
    /// `[line, ch]`
    from: (usize, usize),
    to: Option<(usize, usize)>,
    #[serde(default)]
    text: String,
}

type Bridge = OtBridge<RopeSurface, MemoryDocument>;

fn main() -> Result<()> {
    init_miette();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let source = std::fs::read_to_string(&cli.script)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading {}", cli.script.display()))?;
    let script: Script = serde_json::from_str(&source)
        .into_diagnostic()
        .wrap_err("parsing script")?;

    let doc = Rc::new(match script.initial {
        Some(data) => MemoryDocument::with_data(script.document.as_str(), data),
        None => MemoryDocument::new(script.document.as_str()),
    });
    let editor = Rc::new(RopeSurface::new());

    let errors: Rc<RefCell<Vec<BridgeError>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();
    let verbose = script.options.verbose || cli.verbose;
    let options = script.options.with_verbose(verbose).with_error_handler(move |err| {
        tracing::error!(error = %err, "bridge error");
        sink.borrow_mut().push(err.clone());
    });
    let bridge: Bridge = OtBridge::new(editor.clone(), options);

    attach(&bridge, &doc)?;
    for (index, step) in script.steps.into_iter().enumerate() {
        run_step(&bridge, &editor, &doc, step).wrap_err_with(|| format!("step {index}"))?;
    }
    doc.flush_acks();

    println!("editor:   {:?}", editor.full_text());
    println!(
        "document: {}",
        doc.data().map_or_else(|| "<deleted>".to_owned(), |data| data.to_string())
    );
    println!("version:  {}", doc.version());
    let errors = errors.borrow();
    if !errors.is_empty() {
        println!("{} bridge error(s):", errors.len());
        for err in errors.iter() {
            println!("  {err}");
        }
    }

    if bridge.is_attached() && !bridge.audit() {
        return Err(miette::miette!("editor and document diverged at end of script"));
    }
    Ok(())
}

fn attach(bridge: &Bridge, doc: &Rc<MemoryDocument>) -> Result<()> {
    let outcome = Rc::new(RefCell::new(None));
    let sink = outcome.clone();
    bridge.attach(
        doc.clone(),
        Some(Box::new(move |result| *sink.borrow_mut() = Some(result))),
    );
    // MemoryDocument completes the subscription synchronously.
    let result = outcome.borrow_mut().take();
    match result {
        Some(result) => result.into_diagnostic(),
        None => Err(miette::miette!("subscription to {} never completed", doc.name())),
    }
}

fn run_step(
    bridge: &Bridge,
    editor: &RopeSurface,
    doc: &Rc<MemoryDocument>,
    step: Step,
) -> Result<()> {
    match step {
        Step::Local(edits) => editor.transaction(|surface| {
            for edit in &edits {
                let from = Position::from(edit.from);
                surface.replace_range(&edit.text, from, edit.to.map(Position::from));
            }
        }),
        Step::Remote(op) => doc.apply_remote(&op).into_diagnostic()?,
        Step::Flush => {
            let delivered = doc.flush_acks();
            tracing::info!(delivered, "flushed acknowledgments");
        }
        Step::Audit => {
            if !bridge.audit() {
                tracing::warn!("audit repaired the editor");
            }
        }
        Step::Detach => bridge.detach(),
        Step::Attach => attach(bridge, doc)?,
        Step::Delete => doc.delete_remote(),
    }
    Ok(())
}

fn init_miette() {
    // Only fails if a hook is already installed.
    let _ = miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .build(),
        )
    }));
    miette::set_panic_hook();
}
