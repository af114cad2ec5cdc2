use std::collections::BTreeSet;

use zeroize::Zeroize;

/// ある 1 位置に入りうる断片の集合。
///
/// 要素は重複せず、常にバイト列の辞書順で列挙される。
/// この順序がそのまま候補の列挙順になる。
///
/// drop 時に全ての断片のメモリをゼロ埋めする。
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Group {
    fragments: BTreeSet<String>,
}

impl Group {
    /// 空の `Group` を作る。
    pub fn new() -> Self {
        Self::default()
    }

    /// 断片を追加する。既に含まれていれば `false` を返し、渡された文字列はゼロ埋めして捨てる。
    pub fn insert(&mut self, fragment: String) -> bool {
        if self.fragments.contains(&fragment) {
            let mut fragment = fragment;
            fragment.zeroize();
            return false;
        }

        self.fragments.insert(fragment)
    }

    /// 断片が含まれているかどうかを返す。
    pub fn contains(&self, fragment: &str) -> bool {
        self.fragments.contains(fragment)
    }

    /// 断片の個数を返す。
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// 断片を列挙順に返す。
    pub fn iter(&self) -> impl Iterator<Item = &str> + ExactSizeIterator + Clone {
        self.fragments.iter().map(String::as_str)
    }
}

impl Drop for Group {
    fn drop(&mut self) {
        for mut fragment in std::mem::take(&mut self.fragments) {
            fragment.zeroize();
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Group {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut group = Self::new();
        for fragment in iter {
            group.insert(fragment.into());
        }
        group
    }
}

impl<S: Into<String>> Extend<S> for Group {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for fragment in iter {
            self.insert(fragment.into());
        }
    }
}

/// `Group` の列。並び順がパスフレーズ内の位置の順序になる。
///
/// 空の `Group` も保持するが、候補の列挙時には無視される。
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct GroupSequence(Vec<Group>);

impl GroupSequence {
    /// 空の `GroupSequence` を作る。
    pub fn new() -> Self {
        Self::default()
    }

    /// 末尾に `Group` を追加する。
    pub fn push(&mut self, group: Group) {
        self.0.push(group);
    }

    /// 空のものも含めた `Group` の個数を返す。
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 全ての `Group` を位置の順に返す。
    pub fn iter(&self) -> std::slice::Iter<'_, Group> {
        self.0.iter()
    }

    /// 空でない `Group` のみを位置の順に返す。
    pub fn non_empty(&self) -> impl Iterator<Item = &Group> + Clone {
        self.0.iter().filter(|group| !group.is_empty())
    }
}

impl FromIterator<Group> for GroupSequence {
    fn from_iter<I: IntoIterator<Item = Group>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a GroupSequence {
    type Item = &'a Group;
    type IntoIter = std::slice::Iter<'a, Group>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use itertools::assert_equal;

    use super::*;

    #[test]
    fn test_group_insert_dedup() {
        let mut group = Group::new();

        assert!(group.insert("b".to_owned()));
        assert!(group.insert("a".to_owned()));
        assert!(!group.insert("b".to_owned()));

        assert_eq!(group.len(), 2);
        assert!(group.contains("a"));
        assert!(!group.contains("c"));
        assert_equal(group.iter(), ["a", "b"]);
    }

    #[test]
    fn test_group_from_iter() {
        let group = Group::from_iter(["x", "y", "x", "z"]);
        assert_equal(group.iter(), ["x", "y", "z"]);

        let mut group = Group::new();
        group.extend(["q", "p"]);
        assert_equal(group.iter(), ["p", "q"]);
    }

    #[test]
    fn test_group_sequence_non_empty() {
        let groups: GroupSequence = [
            Group::new(),
            Group::from_iter(["a"]),
            Group::new(),
            Group::from_iter(["b", "c"]),
            Group::new(),
        ]
        .into_iter()
        .collect();

        assert_eq!(groups.len(), 5);
        assert_eq!(groups.non_empty().count(), 2);
        assert_equal(
            groups.non_empty().map(Group::len),
            [1, 2],
        );
    }

    #[test]
    fn test_group_sequence_keeps_position_order() {
        let mut groups = GroupSequence::new();
        assert!(groups.is_empty());

        groups.push(Group::from_iter(["z"]));
        groups.push(Group::from_iter(["a"]));

        assert_equal(
            groups.iter().map(|group| group.iter().next().unwrap()),
            ["z", "a"],
        );
    }
}
