use std::io::{BufRead, ErrorKind};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use zeroize::Zeroize;

use crate::collector::Event;
use crate::memlock::LOCKED_THREAD_STACK_SIZE;

/// EOF や読み込みエラーの後、次の読み込みまで待つ時間。
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// `reader` から行を読み、`Event` として `events` に送るスレッドを起動する。
///
/// スタックは `LOCKED_THREAD_STACK_SIZE` に抑える(`harden` の後でも起動できるように)。
/// 受信側が閉じられるとスレッドは終了する。
/// EOF やエラーの後も読み込みを続ける(端末では EOF の後も入力が続きうる)。
pub fn spawn_line_reader<R>(reader: R, events: Sender<Event>) -> std::io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("recall-input".to_owned())
        .stack_size(LOCKED_THREAD_STACK_SIZE)
        .spawn(move || read_lines(reader, &events))
}

fn read_lines<R: BufRead>(mut reader: R, events: &Sender<Event>) {
    loop {
        let mut buf = String::new();

        let event = match reader.read_line(&mut buf) {
            Ok(0) => Event::Eof,
            Ok(_) => {
                strip_newline(&mut buf);
                Event::Line(buf)
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                buf.zeroize();
                continue;
            }
            Err(e) => {
                tracing::debug!(error = %e, "line read failed");
                buf.zeroize();
                Event::ReadFailed
            }
        };

        let backoff = matches!(event, Event::Eof | Event::ReadFailed);

        if let Err(e) = events.send(event) {
            // 受信側が閉じている: 入力フェーズは終わった。
            if let Event::Line(mut line) = e.0 {
                line.zeroize();
            }
            return;
        }

        if backoff {
            thread::sleep(RETRY_BACKOFF);
        }
    }
}

fn strip_newline(buf: &mut String) {
    if buf.ends_with('\n') {
        buf.pop();
        if buf.ends_with('\r') {
            buf.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn test_strip_newline() {
        let cases = [
            ("abc\n", "abc"),
            ("abc\r\n", "abc"),
            ("abc", "abc"),
            (" a b \n", " a b "),
            ("\n", ""),
            ("a\r", "a\r"),
        ];

        for (input, expected) in cases {
            let mut buf = input.to_owned();
            strip_newline(&mut buf);
            assert_eq!(buf, expected);
        }
    }

    #[test]
    fn test_line_reader_events() {
        let (tx, rx) = mpsc::channel();
        let handle = spawn_line_reader(Cursor::new("a\n\nb c\r\nd"), tx).unwrap();

        let events: Vec<Event> = rx.iter().take(5).collect();
        assert_eq!(
            events,
            [
                Event::Line("a".to_owned()),
                Event::Line(String::new()),
                Event::Line("b c".to_owned()),
                Event::Line("d".to_owned()),
                Event::Eof,
            ]
        );

        drop(rx);
        handle.join().unwrap();
    }

    #[test]
    fn test_line_reader_invalid_utf8() {
        let (tx, rx) = mpsc::channel();
        let handle = spawn_line_reader(Cursor::new(b"\xFF\xFE\nok\n".to_vec()), tx).unwrap();

        let events: Vec<Event> = rx.iter().take(3).collect();
        assert_eq!(
            events,
            [Event::ReadFailed, Event::Line("ok".to_owned()), Event::Eof]
        );

        drop(rx);
        handle.join().unwrap();
    }
}
