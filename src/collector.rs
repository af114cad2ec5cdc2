use zeroize::Zeroize;

use crate::group::{Group, GroupSequence};

/// 入力の区切りを指示する制御信号。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Control {
    /// 現在の位置を閉じ、次の位置の入力に移る。
    Advance,
    /// 入力を終了する。
    Stop,
}

/// `Collector` の状態。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ControlState {
    /// 現在の位置が開かれているが、まだ断片がない。
    AwaitingFirstFragment,
    /// 現在の位置に 1 個以上の断片がある。
    CollectingCurrentGroup,
    /// 入力終了。
    Stopped,
}

impl ControlState {
    /// この状態で割り込みが届いたときに適用される制御信号を返す。
    ///
    /// 断片がない位置を `Advance` で閉じることはできないので、待機中は `Stop` が武装される。
    pub const fn armed(self) -> Option<Control> {
        match self {
            Self::AwaitingFirstFragment => Some(Control::Stop),
            Self::CollectingCurrentGroup => Some(Control::Advance),
            Self::Stopped => None,
        }
    }

    /// この状態で `control` を受け付けるかどうかを返す。
    pub const fn accepts(self, control: Control) -> bool {
        matches!(
            (self, control),
            (Self::CollectingCurrentGroup, Control::Advance)
                | (Self::AwaitingFirstFragment, Control::Stop)
                | (Self::CollectingCurrentGroup, Control::Stop)
        )
    }
}

/// `Collector` に届く入力イベント。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// 1 行分の入力(改行は除去済み)。
    Line(String),
    /// 行の読み込みに失敗した。ストリームはまだ続いている。
    ReadFailed,
    /// 入力ストリームが EOF に達した。
    Eof,
    /// 割り込み。その時点で武装されている制御信号として扱われる。
    Interrupt,
    /// 明示的な制御信号。現在の状態で受け付けられない場合は無視される。
    Control(Control),
}

/// EOF を受け取ったときの振る舞い。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum EofPolicy {
    /// `Stop` として扱う。
    #[default]
    Stop,
    /// 無視して読み込みを続ける。入力を終えるには割り込みが必要。
    Ignore,
}

/// 行入力と制御信号から `GroupSequence` を組み立てる状態機械。
#[derive(Debug)]
pub struct Collector {
    state: ControlState,
    groups: GroupSequence,
    current: Group,
    eof_policy: EofPolicy,
}

impl Collector {
    /// 最初の位置を開いた状態の `Collector` を作る。
    pub fn new(eof_policy: EofPolicy) -> Self {
        Self {
            state: ControlState::AwaitingFirstFragment,
            groups: GroupSequence::new(),
            current: Group::new(),
            eof_policy,
        }
    }

    /// 現在の状態を返す。
    pub fn state(&self) -> ControlState {
        self.state
    }

    /// 現在開いている位置(1 始まり)を返す。
    pub fn position(&self) -> usize {
        self.groups.len() + 1
    }

    /// イベントを 1 つ処理し、処理後の状態を返す。
    ///
    /// `Stopped` になった後のイベントは全て無視される。
    pub fn handle(&mut self, event: Event) -> ControlState {
        if self.state == ControlState::Stopped {
            if let Event::Line(mut line) = event {
                line.zeroize();
            }
            return self.state;
        }

        match event {
            Event::Line(line) => self.insert(line),
            Event::ReadFailed => tracing::debug!("read failed, retrying"),
            Event::Eof => match self.eof_policy {
                EofPolicy::Stop => {
                    tracing::debug!("end of input");
                    self.apply(Control::Stop);
                }
                EofPolicy::Ignore => tracing::trace!("ignoring end of input"),
            },
            Event::Interrupt => {
                if let Some(control) = self.state.armed() {
                    self.apply(control);
                }
            }
            Event::Control(control) => {
                if self.state.accepts(control) {
                    self.apply(control);
                } else {
                    tracing::debug!(?control, state = ?self.state, "control not deliverable");
                }
            }
        }

        self.state
    }

    /// 入力を打ち切り、組み立てた `GroupSequence` を返す。末尾の空の位置もそのまま残る。
    pub fn finish(mut self) -> GroupSequence {
        if self.state != ControlState::Stopped {
            self.apply(Control::Stop);
        }
        std::mem::take(&mut self.groups)
    }

    fn insert(&mut self, line: String) {
        if line.is_empty() {
            return;
        }

        if self.current.insert(line) {
            tracing::trace!(
                position = self.position(),
                fragments = self.current.len(),
                "fragment added"
            );
        }

        if self.state == ControlState::AwaitingFirstFragment {
            self.state = ControlState::CollectingCurrentGroup;
        }
    }

    fn apply(&mut self, control: Control) {
        let closed = std::mem::take(&mut self.current);
        tracing::debug!(
            position = self.position(),
            fragments = closed.len(),
            ?control,
            "position closed"
        );
        self.groups.push(closed);

        self.state = match control {
            Control::Advance => ControlState::AwaitingFirstFragment,
            Control::Stop => ControlState::Stopped,
        };
    }
}

/// `events` を `Collector` に流し込み、`GroupSequence` を得る。
///
/// `Stopped` に達するか `events` が尽きた時点で入力を終える。
pub fn collect<I>(events: I, eof_policy: EofPolicy) -> GroupSequence
where
    I: IntoIterator<Item = Event>,
{
    let mut collector = Collector::new(eof_policy);

    for event in events {
        if collector.handle(event) == ControlState::Stopped {
            break;
        }
    }

    if collector.state() != ControlState::Stopped {
        tracing::debug!("event source ended before stop");
    }

    collector.finish()
}
