use super::AffirmationCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affirmation {
    pub id: &'static str,
    pub category: AffirmationCategory,
    pub text: &'static str,
}

const fn a(id: &'static str, category: AffirmationCategory, text: &'static str) -> Affirmation {
    Affirmation { id, category, text }
}

use AffirmationCategory::*;

/// Built-in affirmations. Ids are stable; the usage ledger refers to them.
pub const CATALOG: &[Affirmation] = &[
    a("sm-01", SalesMomentum, "Every follow-up is a door you keep open."),
    a("sm-02", SalesMomentum, "Momentum is built one conversation at a time."),
    a("sm-03", SalesMomentum, "The fortune is in the follow-up."),
    a("sm-04", SalesMomentum, "You're the person who gets back to people. That wins deals."),
    a("fo-01", Focus, "One contact, one message, right now."),
    a("fo-02", Focus, "Clear the next thing. The rest can wait."),
    a("fo-03", Focus, "Small, focused steps add up fast."),
    a("co-01", Consistency, "Showing up again is the whole trick."),
    a("co-02", Consistency, "Another one done. Consistency compounds."),
    a("co-03", Consistency, "Your routine is doing the heavy lifting."),
    a("co-04", Consistency, "Reliable beats brilliant, and you're both."),
    a("gp-01", GeneralPositive, "Nice work."),
    a("gp-02", GeneralPositive, "You're making progress."),
    a("gp-03", GeneralPositive, "Good things are in motion."),
    a("gp-04", GeneralPositive, "That counts. Keep going."),
    a("re-01", Resilience, "A missed day is a pause, not a stop."),
    a("re-02", Resilience, "Pick it back up. That's what matters."),
    a("re-03", Resilience, "Restarting is a skill, and you have it."),
    a("cp-01", CalmProductivity, "No rush. One thing at a time."),
    a("cp-02", CalmProductivity, "Steady is fast enough."),
    a("cp-03", CalmProductivity, "Breathe, then send the next message."),
];

pub fn pool(category: AffirmationCategory) -> impl Iterator<Item = &'static Affirmation> {
    CATALOG.iter().filter(move |a| a.category == category)
}
