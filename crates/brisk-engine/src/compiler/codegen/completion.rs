//! Statement completion tracking.

/// How control leaves a statement.
///
/// The generator uses this to stop emitting unreachable code and to decide
/// whether a fallthrough jump is needed after a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// Control may fall through
    #[default]
    Normal,
    /// Every path returns
    Return,
    /// Every path throws
    Throw,
    /// Every path breaks
    Break,
    /// Every path continues
    Continue,
    /// Every path leaves, by mixed means
    Abrupt,
}

impl Completion {
    /// Returns true unless control may fall through.
    pub fn is_abrupt(self) -> bool {
        self != Completion::Normal
    }

    /// Sequential composition: `self` followed by `next`.
    pub fn then(self, next: Completion) -> Completion {
        if self.is_abrupt() { self } else { next }
    }

    /// Join of two alternative branches.
    pub fn select(self, other: Completion) -> Completion {
        if self == Completion::Normal || other == Completion::Normal {
            Completion::Normal
        } else if self == other {
            self
        } else {
            Completion::Abrupt
        }
    }

    /// Forces [`Completion::Normal`] when `reachable` says a jump lands
    /// after the statement.
    pub fn normal(self, reachable: bool) -> Completion {
        if reachable { Completion::Normal } else { self }
    }
}

#[cfg(test)]
mod tests {
    use super::Completion::*;
    use super::*;

    const ALL: [Completion; 6] = [Normal, Return, Throw, Break, Continue, Abrupt];

    #[test]
    fn test_then() {
        for x in ALL {
            assert_eq!(Normal.then(x), x);
            assert_eq!(Break.then(x), Break);
        }
        assert_eq!(Throw.then(Return), Throw);
    }

    #[test]
    fn test_select() {
        for y in ALL {
            assert_eq!(Normal.select(y), Normal);
            assert_eq!(y.select(Normal), Normal);
        }
        assert_eq!(Normal.select(Return), Normal);
        assert_eq!(Throw.select(Throw), Throw);
        assert_eq!(Break.select(Continue), Abrupt);
        assert_eq!(Return.select(Throw), Abrupt);
    }

    #[test]
    fn test_normal() {
        assert_eq!(Break.normal(true), Normal);
        assert_eq!(Break.normal(false), Break);
        assert!(!Return.normal(true).is_abrupt());
        assert!(Abrupt.is_abrupt());
    }
}
