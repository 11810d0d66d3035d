use crate::fares::domain::MAX_ZONE_ID;

pub const NEWARK_AIRPORT: u16 = 1;
pub const JFK_AIRPORT: u16 = 132;
pub const LAGUARDIA_AIRPORT: u16 = 138;

/// Drop-offs here bill at the Nassau/Westchester rate.
pub const OUT_OF_CITY_ZONES: [u16; 2] = [86, 265];

/// Manhattan zones south of 96th Street.
pub const MANHATTAN_CONGESTION_ZONES: [u16; 49] = [
    4, 12, 13, 43, 45, 48, 50, 68, 79, 87, 88, 90, 100, 107, 113, 114, 125, 137, 140, 141, 142,
    143, 144, 148, 158, 161, 162, 163, 164, 170, 186, 209, 211, 224, 229, 230, 231, 232, 233, 234,
    236, 237, 238, 239, 246, 249, 261, 262, 263,
];

pub const STATEN_ISLAND_ZONES: [u16; 20] = [
    5, 6, 23, 44, 84, 99, 109, 110, 115, 118, 156, 172, 176, 187, 204, 206, 214, 221, 245, 251,
];

/// Constant-time membership table indexed by zone id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneSet {
    members: Vec<bool>,
}

impl ZoneSet {
    pub fn new(zones: &[u16]) -> Self {
        let mut members = vec![false; MAX_ZONE_ID as usize + 1];
        for &zone in zones {
            if let Some(slot) = members.get_mut(zone as usize) {
                *slot = true;
            }
        }
        Self { members }
    }

    pub fn contains(&self, zone: u16) -> bool {
        self.members.get(zone as usize).copied().unwrap_or(false)
    }
}
