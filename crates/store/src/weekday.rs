//! Set of weekdays a recurring trigger runs on.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Weekday {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    /// Sunday first, matching the bool-array layout used by the edit form.
    pub const ALL: [Weekday; 7] = [
        Weekday::Sunday,
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Weekday::Sunday => "Sunday",
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Weekday {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Weekday::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| StoreError::Format(format!("unknown weekday '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// WeekdaySet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WeekdaySet {
    bits: u8,
}

impl WeekdaySet {
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.bits & day.bit() != 0
    }

    pub fn set(&mut self, day: Weekday, on: bool) {
        if on {
            self.bits |= day.bit();
        } else {
            self.bits &= !day.bit();
        }
    }

    pub fn with(mut self, day: Weekday) -> Self {
        self.set(day, true);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Selected days in Sunday-first order.
    pub fn iter(&self) -> impl Iterator<Item = Weekday> {
        let set = *self;
        Weekday::ALL.into_iter().filter(move |d| set.contains(*d))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(Weekday::name).collect()
    }

    /// Index 0 is Sunday.
    pub fn from_bools(flags: [bool; 7]) -> Self {
        let mut set = Self::empty();
        for (day, on) in Weekday::ALL.into_iter().zip(flags) {
            set.set(day, on);
        }
        set
    }

    pub fn to_bools(&self) -> [bool; 7] {
        Weekday::ALL.map(|d| self.contains(d))
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), WeekdaySet::with)
    }
}

// Serialized as the list of selected day names.

impl Serialize for WeekdaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for day in self.iter() {
            seq.serialize_element(day.name())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for WeekdaySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DaysVisitor;

        impl<'de> Visitor<'de> for DaysVisitor {
            type Value = WeekdaySet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a list of weekday names")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WeekdaySet, A::Error> {
                let mut set = WeekdaySet::empty();
                while let Some(name) = seq.next_element::<String>()? {
                    let day = name.parse::<Weekday>().map_err(|_| {
                        <A::Error as de::Error>::invalid_value(
                            de::Unexpected::Str(&name),
                            &"a weekday name",
                        )
                    })?;
                    set.set(day, true);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_seq(DaysVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subset_round_trips_through_json() {
        for bits in 0u8..128 {
            let set = WeekdaySet { bits };
            let json = serde_json::to_string(&set).unwrap();
            let back: WeekdaySet = serde_json::from_str(&json).unwrap();
            assert_eq!(back, set, "subset {bits:07b} via {json}");
        }
    }

    #[test]
    fn serializes_only_selected_names() {
        let set = WeekdaySet::empty()
            .with(Weekday::Friday)
            .with(Weekday::Monday);
        assert_eq!(
            serde_json::to_string(&set).unwrap(),
            r#"["Monday","Friday"]"#
        );
    }

    #[test]
    fn unknown_name_fails() {
        let err = serde_json::from_str::<WeekdaySet>(r#"["Monday","Funday"]"#).unwrap_err();
        assert!(err.to_string().contains("Funday"), "got {err}");
    }

    #[test]
    fn names_are_case_sensitive() {
        assert!("monday".parse::<Weekday>().is_err());
        assert_eq!("Monday".parse::<Weekday>().unwrap(), Weekday::Monday);
    }

    #[test]
    fn duplicates_collapse() {
        let set: WeekdaySet = serde_json::from_str(r#"["Sunday","Sunday"]"#).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn bool_array_is_sunday_first() {
        let set = WeekdaySet::from_bools([true, false, false, false, false, false, true]);
        assert_eq!(set.names(), vec!["Sunday", "Saturday"]);
        assert_eq!(set.to_bools(), [true, false, false, false, false, false, true]);
    }

    #[test]
    fn clearing_a_day() {
        let mut set: WeekdaySet = [Weekday::Tuesday, Weekday::Thursday].into_iter().collect();
        set.set(Weekday::Tuesday, false);
        assert!(!set.contains(Weekday::Tuesday));
        assert!(set.contains(Weekday::Thursday));
    }
}
