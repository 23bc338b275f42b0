//! Gender-dependent wording for certificate text.

use crate::models::Sex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phrases {
    pub title: &'static str,
    pub pronoun: &'static str,
    pub possessive: &'static str,
    pub relation: &'static str,
    /// "has"/"have" and "is"/"are", agreeing with `pronoun`.
    pub has: &'static str,
    pub is: &'static str,
}

impl Phrases {
    pub fn pronoun_capitalized(&self) -> String {
        let mut chars = self.pronoun.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Chooses wording for a student's sex. Implementations must be total: every `Sex` value
/// gets a phrase set.
pub trait PhrasePolicy: Send + Sync {
    fn phrases(&self, sex: Sex) -> Phrases;
}

const MALE: Phrases = Phrases {
    title: "Mr.",
    pronoun: "he",
    possessive: "his",
    relation: "son of",
    has: "has",
    is: "is",
};

const FEMALE: Phrases = Phrases {
    title: "Ms.",
    pronoun: "she",
    possessive: "her",
    relation: "daughter of",
    has: "has",
    is: "is",
};

/// Certificate wording used by the registry. Unspecified sex falls back to the
/// masculine forms the printed templates have always used.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardPhrases;

impl PhrasePolicy for StandardPhrases {
    fn phrases(&self, sex: Sex) -> Phrases {
        match sex {
            Sex::Female => FEMALE,
            Sex::Male | Sex::Unspecified => MALE,
        }
    }
}

/// Neutral wording for institutions that do not print gendered forms.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralPhrases;

impl PhrasePolicy for NeutralPhrases {
    fn phrases(&self, _sex: Sex) -> Phrases {
        Phrases {
            title: "",
            pronoun: "they",
            possessive: "their",
            relation: "child of",
            has: "have",
            is: "are",
        }
    }
}
