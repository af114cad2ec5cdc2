use std::ffi::OsString;
use std::io::{ErrorKind, Write as _};
use std::process::{Command, Stdio};

use thiserror::Error;

/// 候補が目的のパスフレーズかどうかを判定するもの。
///
/// `context` は判定対象(鍵 ID など)を表す任意の文字列で、列挙側は中身を解釈しない。
/// 同じ `candidate` と `context` に対しては同じ結果を返さなければならない。
pub trait Verifier {
    fn verify(&mut self, candidate: &str, context: &str) -> Result<bool, VerifyError>;
}

impl<F> Verifier for F
where
    F: FnMut(&str, &str) -> bool,
{
    fn verify(&mut self, candidate: &str, context: &str) -> Result<bool, VerifyError> {
        Ok(self(candidate, context))
    }
}

/// GnuPG の秘密鍵で署名を試み、パスフレーズが正しいかどうかを判定する。
///
/// 候補は子プロセスの標準入力経由で渡す(シェルは介さない)。
/// `context` が空でなければ `--local-user` として渡し、空ならデフォルトの鍵を使う。
#[derive(Clone, Debug)]
pub struct GpgVerifier {
    program: OsString,
}

impl GpgVerifier {
    /// 既定のプログラム名。
    pub const DEFAULT_PROGRAM: &'static str = "gpg";

    /// 実行するプログラムを指定して `GpgVerifier` を作る。
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// 実行するプログラムを返す。
    pub fn program(&self) -> &OsString {
        &self.program
    }

    fn command(&self, context: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "-q",
            "--batch",
            "--passphrase-fd",
            "0",
            "--pinentry-mode",
            "loopback",
            "--output",
            "/dev/null",
            "--yes",
        ]);
        if !context.is_empty() {
            cmd.arg("--local-user").arg(context);
        }
        cmd.args(["--sign", "/dev/null"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl Default for GpgVerifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PROGRAM)
    }
}

impl Verifier for GpgVerifier {
    fn verify(&mut self, candidate: &str, context: &str) -> Result<bool, VerifyError> {
        let mut child = self
            .command(context)
            .spawn()
            .map_err(|source| VerifyError::Spawn {
                program: self.program_name(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let written = stdin
                .write_all(candidate.as_bytes())
                .and_then(|()| stdin.write_all(b"\n"));
            match written {
                // 子プロセスが入力を読まずに終了した。終了コードで判定する。
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                Err(source) => {
                    drop(stdin);
                    let _ = child.wait();
                    return Err(VerifyError::Stdin {
                        program: self.program_name(),
                        source,
                    });
                }
                Ok(()) => {}
            }
        }

        let status = child.wait().map_err(|source| VerifyError::Wait {
            program: self.program_name(),
            source,
        })?;

        match status.code() {
            Some(0) => Ok(true),
            Some(code) => {
                tracing::trace!(code, "candidate rejected");
                Ok(false)
            }
            None => Err(VerifyError::Terminated {
                program: self.program_name(),
            }),
        }
    }
}

/// 判定時に発生しうるエラー。判定不能を意味する。
#[derive(Debug, Error)]
pub enum VerifyError {
    /// プログラムを起動できなかった。
    #[error("failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// 候補を標準入力に書き込めなかった。
    #[error("failed to write candidate to `{program}`")]
    Stdin {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// 終了を待てなかった。
    #[error("failed to wait for `{program}`")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// 終了コードなしで終了した(シグナルなど)。
    #[error("`{program}` terminated without an exit code")]
    Terminated { program: String },

    /// その他の判定不能。
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_verifier() {
        let mut calls = Vec::new();
        let mut verifier = |candidate: &str, context: &str| {
            calls.push((candidate.to_owned(), context.to_owned()));
            candidate == "yes"
        };

        assert!(verifier.verify("yes", "key").unwrap());
        assert!(!verifier.verify("no", "").unwrap());

        assert_eq!(
            calls,
            [
                ("yes".to_owned(), "key".to_owned()),
                ("no".to_owned(), String::new()),
            ]
        );
    }

    #[test]
    fn test_gpg_command_args() {
        let verifier = GpgVerifier::default();
        assert_eq!(verifier.program(), "gpg");

        let cmd = verifier.command("0xDEADBEEF");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(cmd.get_program(), "gpg");
        assert!(args.windows(2).any(|w| w == ["--local-user", "0xDEADBEEF"]));
        assert!(args.windows(2).any(|w| w == ["--passphrase-fd", "0"]));
        assert_eq!(args[args.len() - 2..], ["--sign", "/dev/null"]);

        let cmd = verifier.command("");
        assert!(!cmd.get_args().any(|arg| arg == "--local-user"));
    }

    #[cfg(unix)]
    #[test]
    fn test_gpg_verifier_exit_status() {
        // 引数を無視して終了コードだけを返すプログラムで代用する。
        assert!(GpgVerifier::new("true").verify("candidate", "").unwrap());
        assert!(!GpgVerifier::new("false").verify("candidate", "key").unwrap());
    }

    #[test]
    fn test_gpg_verifier_spawn_error() {
        let mut verifier = GpgVerifier::new("recall-test-no-such-program");
        assert!(matches!(
            verifier.verify("candidate", ""),
            Err(VerifyError::Spawn { .. })
        ));
    }
}
