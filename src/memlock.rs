use std::env;
use std::io;

use thiserror::Error;

/// デバッグビルドでのみ参照される。`1` なら `harden` はページのロックを省略する。
pub const RECALL_ALLOW_SWAP: &str = "RECALL_ALLOW_SWAP";

/// ページのロック後に起動するスレッドのスタックサイズ。
///
/// `MCL_FUTURE` の下では新しいスタック全体が `RLIMIT_MEMLOCK` に計上される。
pub const LOCKED_THREAD_STACK_SIZE: usize = 256 * 1024;

/// 断片がスワップやコアダンプに書き出されないようにする。
///
/// プロセスの現在および将来のページを全てロックし、コアダンプを無効化する。
/// 以後に起動するスレッドのデフォルトのスタックは `LOCKED_THREAD_STACK_SIZE` になる。
///
/// スレッドを 1 つも起動していない段階で一度だけ呼ぶこと。効果はプロセス終了まで続く。
pub fn harden() -> Result<(), MemLockError> {
    if swap_allowed() {
        tracing::warn!(
            env_var = RECALL_ALLOW_SWAP,
            "memory locking skipped (debug build)"
        );
        return Ok(());
    }

    cap_default_thread_stack();
    lock_pages()?;
    tracing::debug!("process memory locked");
    Ok(())
}

#[cfg(debug_assertions)]
fn swap_allowed() -> bool {
    env::var_os(RECALL_ALLOW_SWAP).is_some_and(|value| value == "1")
}

#[cfg(not(debug_assertions))]
fn swap_allowed() -> bool {
    false
}

/// std のスレッドは `RUST_MIN_STACK` を最初の起動時に一度だけ読む。
/// 利用者が明示的に指定していればそれに従う。
fn cap_default_thread_stack() {
    if env::var_os("RUST_MIN_STACK").is_none() {
        env::set_var("RUST_MIN_STACK", LOCKED_THREAD_STACK_SIZE.to_string());
    }
}

#[cfg(unix)]
fn lock_pages() -> Result<(), MemLockError> {
    // スレッドごとのアリーナ(64 MiB の予約)もロック対象になるので、アリーナは 1 つに限る。
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        unsafe { libc::mallopt(libc::M_ARENA_MAX, 1) };
    }

    check(unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) })
        .map_err(MemLockError::Lock)?;

    let no_core = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    check(unsafe { libc::setrlimit(libc::RLIMIT_CORE, &no_core) })
        .map_err(MemLockError::CoreDump)?;

    #[cfg(target_os = "linux")]
    {
        check(unsafe { libc::prctl(libc::PR_SET_DUMPABLE, 0, 0, 0, 0) })
            .map_err(MemLockError::CoreDump)?;
    }

    Ok(())
}

#[cfg(not(unix))]
fn lock_pages() -> Result<(), MemLockError> {
    Err(MemLockError::Unsupported)
}

#[cfg(unix)]
fn check(rc: libc::c_int) -> io::Result<()> {
    match rc {
        0 => Ok(()),
        _ => Err(io::Error::last_os_error()),
    }
}

/// `harden` で発生しうるエラー。いずれも致命的。
#[derive(Debug, Error)]
pub enum MemLockError {
    /// ページをロックできなかった。
    #[error("mlockall(MCL_CURRENT | MCL_FUTURE) failed")]
    Lock(#[source] io::Error),

    /// コアダンプを無効化できなかった。
    #[error("failed to disable core dumps")]
    CoreDump(#[source] io::Error),

    /// このプラットフォームではページをロックできない。
    #[error("memory locking is not supported on this platform")]
    Unsupported,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_default_thread_stack() {
        // std は既にこの値を読み終えているので、書き換えても他のテストには影響しない。
        env::remove_var("RUST_MIN_STACK");
        cap_default_thread_stack();
        assert_eq!(
            env::var("RUST_MIN_STACK").unwrap(),
            LOCKED_THREAD_STACK_SIZE.to_string()
        );

        env::set_var("RUST_MIN_STACK", "131072");
        cap_default_thread_stack();
        assert_eq!(env::var("RUST_MIN_STACK").unwrap(), "131072");

        env::remove_var("RUST_MIN_STACK");
    }

    #[cfg(unix)]
    #[test]
    fn test_check() {
        assert!(check(0).is_ok());
        assert!(check(-1).is_err());
    }
}
