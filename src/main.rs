use std::io::{self, BufReader, Write as _};
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{Context as _, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use recall::*;

const LICENSE: &str = "Licensed under GPLv2 <https://www.gnu.org/licenses/gpl-2.0.html>";

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n",
    "Licensed under GPLv2 <https://www.gnu.org/licenses/gpl-2.0.html>",
);

/// Regenerate a partially forgotten passphrase.
///
/// Type the fragments that may occupy each position of the passphrase, one per
/// line. Ctrl-C moves on to the next position; Ctrl-C on an empty position (or
/// end-of-file) finishes input. Every combination is then tested against a
/// local GnuPG key.
#[derive(Debug, Parser)]
#[command(name = "recall", version, long_version = LONG_VERSION)]
struct Cli {
    /// Return on first match
    #[arg(short = '1', long, default_value_t = true, action = ArgAction::Set)]
    return_on_first: bool,

    /// Key to be tested (default key if empty)
    #[arg(long, default_value = "")]
    key_id: String,

    /// What end-of-file on standard input means
    #[arg(long, value_enum, default_value_t = OnEof::Stop)]
    on_eof: OnEof,

    /// GnuPG executable used to test candidates
    #[arg(long, default_value = GpgVerifier::DEFAULT_PROGRAM)]
    gpg: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OnEof {
    /// Finish input
    Stop,
    /// Keep reading; only Ctrl-C finishes input
    Ignore,
}

impl From<OnEof> for EofPolicy {
    fn from(on_eof: OnEof) -> Self {
        match on_eof {
            OnEof::Stop => Self::Stop,
            OnEof::Ignore => Self::Ignore,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    tracing::debug!(?cli, "starting");

    eprintln!(
        "recall {} – regenerate partially forgotten passphrases\n{LICENSE}\n",
        env!("CARGO_PKG_VERSION")
    );

    // スレッドを起動する前に呼ぶ。
    harden().context("failed to lock process memory")?;

    eprintln!("Gathering input…");
    let groups = gather_input(cli.on_eof.into())?;

    eprintln!("Wrapping up…");
    let mut verifier = GpgVerifier::new(&cli.gpg);
    tracing::debug!(program = ?verifier.program(), "testing candidates");
    let options = SearchOptions {
        stop_on_first_match: cli.return_on_first,
    };
    let report = search(&groups, &mut verifier, &cli.key_id, options);

    if report.failed() > 0 {
        eprintln!(
            "warning: {} of {} candidates could not be tested",
            report.failed(),
            report.tested()
        );
    }

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "The following matches were found:")?;
    for candidate in report.matches() {
        writeln!(stdout, "{candidate}")?;
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("recall=warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

/// 標準入力と割り込みから `GroupSequence` を組み立てる。
///
/// 割り込みの購読は入力フェーズの間だけ保持する。
fn gather_input(eof_policy: EofPolicy) -> Result<GroupSequence> {
    let (tx, rx) = mpsc::channel();

    let _subscription =
        ControlSubscription::acquire(tx.clone()).context("failed to set up interrupt handling")?;
    spawn_line_reader(BufReader::new(io::stdin()), tx)
        .context("failed to start input reader")?;

    let mut collector = Collector::new(eof_policy);
    prompt(collector.position());

    for event in rx.iter() {
        let interrupted = matches!(event, Event::Interrupt);
        let position = collector.position();

        let state = collector.handle(event);
        if interrupted {
            eprintln!();
        }
        if state == ControlState::Stopped {
            break;
        }
        if collector.position() != position {
            prompt(collector.position());
        }
    }

    Ok(collector.finish())
}

fn prompt(position: usize) {
    eprint!("position {position}: ");
    let _ = io::stderr().flush();
}
