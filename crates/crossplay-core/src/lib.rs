pub mod layout;
pub mod net;
pub mod normalize;
pub mod player;
pub mod room;
pub mod session;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::layout::{Direction, PlacedWord};
    use crate::player::{Player, PlayerId};

    /// Create a participant with no provider tag.
    pub fn make_player(id: PlayerId, name: &str) -> Player {
        Player::new(id, name.to_string(), None)
    }

    /// Create `n` test players with sequential IDs starting at 1.
    pub fn make_players(n: usize) -> Vec<Player> {
        (0..n)
            .map(|i| make_player(i as PlayerId + 1, &format!("Player{}", i + 1)))
            .collect()
    }

    /// Build unrevealed puzzle words without running the layout engine.
    /// Words are stacked Across on alternating rows; geometry is not valid
    /// crossword structure and only serves session tests.
    pub fn make_words(texts: &[&str]) -> Vec<PlacedWord> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| PlacedWord {
                id: i as u32 + 1,
                text: text.to_string(),
                direction: Direction::Across,
                row: i * 2,
                col: 0,
                revealed: false,
                revealed_by: None,
            })
            .collect()
    }

    /// Themed vocabulary that yields a playable layout on the default grid.
    pub const SAMPLE_VOCAB: &[&str] = &[
        "ELEPHANT", "GIRAFFE", "KANGAROO", "PENGUIN", "DOLPHIN", "TIGER", "ZEBRA", "LION",
        "MONKEY", "RABBIT", "TURTLE", "PARROT", "SQUIRREL", "HAMSTER", "CAMEL", "OTTER",
        "BEAVER", "RACCOON", "LEOPARD", "CHEETAH", "BUFFALO", "GORILLA", "HORSE", "SNAKE",
        "EAGLE", "SHARK", "WHALE", "MOUSE", "GOAT", "SHEEP",
    ];
}
