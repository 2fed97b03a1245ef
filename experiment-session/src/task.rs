use std::collections::HashSet;

use common_types::{CardId, Variant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Card {
    pub id: CardId,
    pub label: &'static str,
}

/// One four-card selection task. Every variant tests the same rule form,
/// only the context changes.
#[derive(Debug, PartialEq, Eq)]
pub struct Task {
    pub condition: Variant,
    pub title: &'static str,
    pub prompt: &'static str,
    pub cards: [Card; 4],
    pub correct: &'static [CardId],
}

impl Task {
    /// Set equality with the correct cards: order and repeats don't matter.
    pub fn is_correct(&self, selection: &[CardId]) -> bool {
        let selected: HashSet<CardId> = selection.iter().copied().collect();
        let correct: HashSet<CardId> = self.correct.iter().copied().collect();
        selected == correct
    }

    pub fn label(&self, card: CardId) -> Option<&'static str> {
        self.cards.iter().find(|c| c.id == card).map(|c| c.label)
    }
}

static ABSTRACT: Task = Task {
    condition: Variant::A,
    title: "Situation A: Abstract condition",
    prompt: "You are shown a set of four cards placed on a table, each of which has a number \
        on one side and a color on the other. The visible faces of the cards show 3, 8, blue, \
        and red. Which card(s) must you turn over in order to test the rule that if a card \
        shows an even number on one face, then its opposite face is blue?",
    cards: [
        Card { id: CardId::C1, label: "8" },
        Card { id: CardId::C2, label: "3" },
        Card { id: CardId::C3, label: "blue" },
        Card { id: CardId::C4, label: "red" },
    ],
    correct: &[CardId::C1, CardId::C4],
};

static FAMILIAR: Task = Task {
    condition: Variant::B,
    title: "Situation B: Familiar context",
    prompt: "You are shown a set of four cards placed on a table, each of which has a \
        person's drink on one side and that person's age on the other. The visible faces of \
        the cards show Beer, Soda, 22, and 16. Which card(s) must you turn over in order to \
        test the rule that if a person is drinking beer, then they must be 21 or older?",
    cards: [
        Card { id: CardId::C1, label: "Beer" },
        Card { id: CardId::C2, label: "Soda" },
        Card { id: CardId::C3, label: "22" },
        Card { id: CardId::C4, label: "16" },
    ],
    correct: &[CardId::C1, CardId::C4],
};

static UNFAMILIAR: Task = Task {
    condition: Variant::C,
    title: "Situation C: Unfamiliar context",
    prompt: "You are shown a set of four cards placed on a table, each of which has a \
        technician's current location on one side and whether they are wearing a required \
        badge on the other. The visible faces of the cards show Oxygen module, Gym module, \
        Seal-check badge, and No seal-check badge. Which card(s) must you turn over in order \
        to test the rule that if a technician enters the oxygen module, then they must wear \
        a seal-check badge?",
    cards: [
        Card { id: CardId::C1, label: "Oxygen module" },
        Card { id: CardId::C2, label: "Gym module" },
        Card { id: CardId::C3, label: "Seal-check badge" },
        Card { id: CardId::C4, label: "No seal-check badge" },
    ],
    correct: &[CardId::C1, CardId::C4],
};

pub fn task_for(condition: Variant) -> &'static Task {
    match condition {
        Variant::A => &ABSTRACT,
        Variant::B => &FAMILIAR,
        Variant::C => &UNFAMILIAR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_variant_has_its_task() {
        for variant in Variant::ALL {
            let task = task_for(variant);
            assert_eq!(task.condition, variant);

            let ids: Vec<CardId> = task.cards.iter().map(|c| c.id).collect();
            assert_eq!(ids, CardId::ALL.to_vec());
        }
        assert_eq!(task_for(Variant::B).label(CardId::C4), Some("16"));
    }

    #[test]
    fn test_correctness_is_set_equality() {
        let task = task_for(Variant::A);

        assert!(task.is_correct(&[CardId::C1, CardId::C4]));
        assert!(task.is_correct(&[CardId::C4, CardId::C1]));

        assert!(!task.is_correct(&[]));
        assert!(!task.is_correct(&[CardId::C1]));
        assert!(!task.is_correct(&[CardId::C1, CardId::C3]));
        assert!(!task.is_correct(&[CardId::C1, CardId::C3, CardId::C4]));
    }
}
