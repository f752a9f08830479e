//! Wordlist-based code completion: the words appended to an allocated nameplate.

use rand::{rngs::OsRng, seq::SliceRandom};
use std::fmt;

use crate::ids::Password;

/// Even-indexed words (2-syllable), used for the first, third, fifth, ... word of a code.
const EVEN_WORDS: &[&str] = &[
    "adroitness",
    "adviser",
    "aardvark",
    "alkali",
    "almighty",
    "amulet",
    "amusement",
    "antenna",
    "applicant",
    "Apollo",
    "armistice",
    "article",
    "asteroid",
    "Atlantic",
    "atmosphere",
    "autopsy",
    "babylon",
    "backfield",
    "backward",
    "banjo",
    "beaming",
    "bedlamp",
    "beehive",
    "beeswax",
    "befriend",
    "Belfast",
    "berserk",
    "billiard",
    "bison",
    "blackjack",
    "blockade",
    "blowtorch",
];

/// Odd-indexed words (1-syllable), used for the second, fourth, sixth, ... word of a code.
const ODD_WORDS: &[&str] = &[
    "aardvark",
    "absurd",
    "accrue",
    "acme",
    "adrift",
    "adult",
    "afflict",
    "ahead",
    "aimless",
    "Algol",
    "allow",
    "alone",
    "ammo",
    "ancient",
    "apple",
    "artist",
    "assume",
    "Athens",
    "atlas",
    "Aztec",
    "baboon",
    "backup",
    "bagpipe",
    "banter",
    "basin",
    "beaming",
    "bedroom",
    "Belfast",
    "beneath",
    "bingo",
    "border",
    "bowler",
];

/// The even/odd word lists used to decorate an allocated nameplate with human-memorable
/// words, one drawn from the even list, one from the odd list, alternating.
#[derive(PartialEq)]
pub struct Wordlist {
    num_words: usize,
    words: Vec<Vec<String>>,
}

impl fmt::Debug for Wordlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wordlist({}, lots of words...)", self.num_words)
    }
}

impl Wordlist {
    #[cfg(test)]
    pub fn new(num_words: usize, words: Vec<Vec<String>>) -> Wordlist {
        Wordlist { num_words, words }
    }

    /// The fixed built-in wordlist, for a code requesting `num_words` appended words.
    pub fn default_wordlist(num_words: usize) -> Wordlist {
        Wordlist {
            num_words,
            words: vec![
                EVEN_WORDS.iter().map(|s| s.to_string()).collect(),
                ODD_WORDS.iter().map(|s| s.to_string()).collect(),
            ],
        }
    }

    /// Draw `num_words` words, alternating even/odd lists, and join with `-`.
    pub fn choose_words(&self) -> Password {
        let mut rng = OsRng;
        let components = self
            .words
            .iter()
            .cycle()
            .take(self.num_words)
            .map(|words| words.choose(&mut rng).unwrap().as_str())
            .collect::<Vec<&str>>();
        Password(components.join("-"))
    }
}
