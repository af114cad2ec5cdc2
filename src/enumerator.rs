use std::iter::FusedIterator;

use zeroize::Zeroize;

use crate::group::GroupSequence;
use crate::verifier::Verifier;

/// 各位置から断片を 1 つずつ選んで連結した候補を、オドメーター順に列挙するイテレータ。
///
/// 最後の位置が最も速く変化し、一周すると 1 つ前の位置に繰り上がる。
/// 空の位置は無視する。全ての位置が空なら何も列挙しない。
///
/// 列挙開始時に各位置の断片を固定長の配列に写し取り、位置ごとの添字のみを状態として持つ。
/// よってメモリ使用量は位置の個数にのみ依存する。
#[derive(Clone, Debug)]
pub struct Odometer<'a> {
    wheels: Vec<Vec<&'a str>>,
    cursors: Vec<usize>,
    exhausted: bool,
}

impl<'a> Odometer<'a> {
    /// `groups` の先頭の候補を指す `Odometer` を作る。
    pub fn new(groups: &'a GroupSequence) -> Self {
        let wheels: Vec<Vec<&str>> = groups
            .non_empty()
            .map(|group| group.iter().collect())
            .collect();
        let exhausted = wheels.is_empty();

        Self {
            cursors: vec![0; wheels.len()],
            wheels,
            exhausted,
        }
    }

    /// 候補の総数を返す。`u128` に収まらなければ `None` を返す。
    pub fn total(&self) -> Option<u128> {
        if self.wheels.is_empty() {
            return Some(0);
        }

        self.wheels
            .iter()
            .try_fold(1_u128, |acc, wheel| acc.checked_mul(wheel.len() as u128))
    }

    /// 未列挙の候補数を返す。`u128` に収まらなければ `None` を返す。
    pub fn remaining(&self) -> Option<u128> {
        if self.exhausted {
            return Some(0);
        }

        // 現在位置を混合基数の数値とみなす。
        let index = self
            .wheels
            .iter()
            .zip(&self.cursors)
            .try_fold(0_u128, |acc, (wheel, &cursor)| {
                acc.checked_mul(wheel.len() as u128)?
                    .checked_add(cursor as u128)
            })?;

        Some(self.total()? - index)
    }

    /// 次に列挙する候補の、各位置における添字を返す。列挙し終えていれば `None` を返す。
    pub fn position(&self) -> Option<&[usize]> {
        (!self.exhausted).then_some(self.cursors.as_slice())
    }

    fn current(&self) -> String {
        let len = self
            .wheels
            .iter()
            .zip(&self.cursors)
            .map(|(wheel, &cursor)| wheel[cursor].len())
            .sum();

        let mut candidate = String::with_capacity(len);
        for (wheel, &cursor) in self.wheels.iter().zip(&self.cursors) {
            candidate.push_str(wheel[cursor]);
        }
        candidate
    }

    fn step(&mut self) {
        for (wheel, cursor) in self.wheels.iter().zip(self.cursors.iter_mut()).rev() {
            *cursor += 1;
            if *cursor < wheel.len() {
                return;
            }
            *cursor = 0;
        }

        // 先頭の位置を越えて繰り上がった。
        self.exhausted = true;
    }
}

impl Iterator for Odometer<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let candidate = self.current();
        self.step();
        Some(candidate)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.remaining().map(usize::try_from) {
            Some(Ok(n)) => (n, Some(n)),
            _ => (usize::MAX, None),
        }
    }
}

impl FusedIterator for Odometer<'_> {}

/// 探索の設定。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SearchOptions {
    /// 最初に一致した時点で探索を打ち切るかどうか。
    pub stop_on_first_match: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            stop_on_first_match: true,
        }
    }
}

/// 探索結果。
///
/// drop 時に一致した候補のメモリをゼロ埋めする。
#[derive(Debug, Default, Eq, PartialEq)]
pub struct SearchReport {
    matches: Vec<String>,
    tested: u64,
    failed: u64,
}

impl SearchReport {
    /// 一致した候補を発見順に返す。
    pub fn matches(&self) -> &[String] {
        &self.matches
    }

    /// 判定した候補数を返す(判定不能だったものを含む)。
    pub fn tested(&self) -> u64 {
        self.tested
    }

    /// 判定不能だった候補数を返す。
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// 一致した候補を取り出す。取り出した文字列のゼロ埋めは呼び出し側の責任となる。
    pub fn into_matches(mut self) -> Vec<String> {
        std::mem::take(&mut self.matches)
    }
}

impl Drop for SearchReport {
    fn drop(&mut self) {
        self.matches.zeroize();
    }
}

/// `groups` の候補をオドメーター順に `verifier` で判定し、一致したものを集める。
///
/// 判定不能だった候補は不一致として扱い、探索を続ける。
/// 空でない位置が 1 つもなければ `verifier` は一度も呼ばれない。
pub fn search<V>(
    groups: &GroupSequence,
    verifier: &mut V,
    context: &str,
    options: SearchOptions,
) -> SearchReport
where
    V: Verifier + ?Sized,
{
    let odometer = Odometer::new(groups);
    let mut report = SearchReport::default();

    tracing::info!(
        positions = groups.non_empty().count(),
        total = ?odometer.total(),
        "searching candidates"
    );

    for mut candidate in odometer {
        report.tested += 1;

        match verifier.verify(&candidate, context) {
            Ok(true) => {
                tracing::info!(tested = report.tested, "match found");
                report.matches.push(candidate);
                if options.stop_on_first_match {
                    break;
                }
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                report.failed += 1;
                tracing::warn!(
                    tested = report.tested,
                    error = &e as &dyn std::error::Error,
                    "candidate could not be verified"
                );
            }
        }

        candidate.zeroize();
    }

    tracing::info!(
        tested = report.tested,
        failed = report.failed,
        matches = report.matches.len(),
        "search finished"
    );

    report
}
