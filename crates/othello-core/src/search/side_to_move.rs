/// Which side of the root player is to move at the current node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SideToMove {
    /// The side the search was started for.
    Player,
    /// The other side.
    Opponent,
}

impl SideToMove {
    #[inline]
    pub fn switch(self) -> SideToMove {
        match self {
            SideToMove::Player => SideToMove::Opponent,
            SideToMove::Opponent => SideToMove::Player,
        }
    }
}
