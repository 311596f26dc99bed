#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerStatus {
    /// Announced by the world service, handshake not finished.
    Joined,
    Spectating,
    Playing,
}

impl PlayerStatus {
    pub fn is_admitted(self) -> bool {
        self != Self::Joined
    }
}
