use std::sync::mpsc::Sender;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use thiserror::Error;

use crate::collector::Event;

/// 割り込みのデフォルト動作を模した終了コード (128 + SIGINT)。
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// 割り込みハンドラのインストール結果。プロセス内で一度だけインストールする。
static HANDLER: OnceCell<()> = OnceCell::new();

/// 割り込みの送り先。購読されていなければ `None`。
static SUBSCRIBER: Lazy<Mutex<Option<Sender<Event>>>> = Lazy::new(|| Mutex::new(None));

/// 割り込みを `Event::Interrupt` として受け取る購読。
///
/// 購読中の割り込みは全てチャネルに送られ、プロセスは終了しない。
/// drop すると購読が解除され、以後の割り込みはプロセスを終了させる。
#[derive(Debug)]
pub struct ControlSubscription {
    _private: (),
}

impl ControlSubscription {
    /// 割り込みの購読を開始する。
    pub fn acquire(events: Sender<Event>) -> Result<Self, ControlError> {
        HANDLER.get_or_try_init(|| ctrlc::set_handler(on_interrupt))?;

        let mut subscriber = SUBSCRIBER.lock();
        if subscriber.is_some() {
            return Err(ControlError::AlreadySubscribed);
        }
        *subscriber = Some(events);

        tracing::debug!("interrupt subscription acquired");

        Ok(Self { _private: () })
    }
}

impl Drop for ControlSubscription {
    fn drop(&mut self) {
        SUBSCRIBER.lock().take();
        tracing::debug!("interrupt subscription released");
    }
}

fn on_interrupt() {
    let delivered = SUBSCRIBER
        .lock()
        .as_ref()
        .is_some_and(|events| events.send(Event::Interrupt).is_ok());

    if !delivered {
        std::process::exit(INTERRUPTED_EXIT_CODE);
    }
}

/// 割り込みの購読時に発生しうるエラー。
#[derive(Debug, Error)]
pub enum ControlError {
    /// 割り込みハンドラをインストールできなかった。
    #[error("failed to install interrupt handler")]
    Install(#[from] ctrlc::Error),

    /// 既に別の購読が存在する。
    #[error("interrupts are already subscribed")]
    AlreadySubscribed,
}
