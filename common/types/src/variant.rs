use serde::{Deserialize, Serialize};

/// One of the experimental treatments a participant can be assigned to.
///
/// The set is closed and fixed at deploy time. Declaration order is the order
/// used when listing tied variants.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
pub enum Variant {
    A,
    B,
    C,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::A, Variant::B, Variant::C];

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}
