//! Grid listing entries
//!
//! The stream grid mixes registry-backed streams with "coming soon"
//! placeholders. They are distinct variants so nothing downstream can
//! mistake a placeholder for a playable stream.

use serde::Serialize;

use super::stream::StreamRecord;

/// Placeholder content for a slot not backed by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoData {
    /// Position in the demo catalogue; `id()` is derived from it
    pub slot: usize,
    pub username: String,
    pub title: String,
    pub description: String,
    pub viewers: u32,
    pub tags: Vec<String>,
}

impl DemoData {
    /// Display id, namespaced so it can never collide with a registry id
    #[must_use]
    pub fn id(&self) -> String {
        format!("demo-{}", self.slot)
    }
}

/// One entry of the stream grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEntry {
    Real(StreamRecord),
    Placeholder(DemoData),
}

impl StreamEntry {
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::Real(record) => record.id.to_string(),
            Self::Placeholder(demo) => demo.id(),
        }
    }

    #[must_use]
    pub const fn as_record(&self) -> Option<&StreamRecord> {
        match self {
            Self::Real(record) => Some(record),
            Self::Placeholder(_) => None,
        }
    }
}

/// Built-in "coming soon" catalogue shown after the real streams
#[must_use]
pub fn demo_catalog() -> Vec<DemoData> {
    const ENTRIES: &[(&str, &str, &str, u32, &[&str])] = &[
        ("toolpro", "ACCESSORIES SHOW", "All Tool Accessories Showdown! GIVEAWAYS ALL SHOW!", 116, &["Tools"]),
        ("torquex", "TORQUE X", "Milwaukee, Dewalt & more starting @$1", 62, &["Tools"]),
        ("greendepot", "RYOBI BOXES", "Huge collection of green tool boxes", 58, &["Tools"]),
        ("turbodepot", "TURBO DEPOT", "HD DEALS GIVEAWAY EVERY 5 MINUTES", 76, &["Electronics"]),
        ("familybaby", "KIDS AND BABY CLOTHING", "Kids and baby clothing TARGET reduced shipping", 65, &["Baby & Kids"]),
        ("homedecor", "HOME DECOR SALE", "Crazy home decor sale NONSTOP GIVEAWAY", 85, &["Home"]),
        ("edcknives", "KNIVES FOR SALE", "Best EDC knives starting at $1", 104, &["Knives & EDC"]),
        ("exclusivewatches", "EXCLUSIVE WATCHES", "Exclusives only, starting at $1", 355, &["Accessories"]),
        ("dailytech", "DAILY ELECTRONICS", "Amazing deals on electronics every day", 92, &["Electronics"]),
        ("wholesalepallets", "WHOLESALE PALLETS", "Liquidation pallets starting at $50", 128, &["Pallets", "Wholesale"]),
        ("outdoorhunt", "HUNTING & OUTDOOR", "Hunting gear and outdoor activities", 73, &["Knives & Hunting"]),
        ("techdeals", "TECH DEALS", "Best deals on technology and gadgets", 201, &["Electronics"]),
    ];

    ENTRIES
        .iter()
        .enumerate()
        .map(|(slot, (username, title, description, viewers, tags))| DemoData {
            slot,
            username: (*username).to_string(),
            title: (*title).to_string(),
            description: (*description).to_string(),
            viewers: *viewers,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_ids_are_namespaced() {
        let catalog = demo_catalog();
        assert_eq!(catalog.len(), 12);
        assert_eq!(catalog[0].id(), "demo-0");
        assert!(catalog.iter().all(|d| d.id().starts_with("demo-")));
    }

    #[test]
    fn test_placeholder_is_not_a_record() {
        let entry = StreamEntry::Placeholder(demo_catalog().remove(0));
        assert!(entry.as_record().is_none());

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "placeholder");
    }
}
