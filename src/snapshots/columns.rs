//! Column alias resolution.
//!
//! Snapshot exports come from different tools and languages, so the same
//! metric shows up under several headers. Every header is trimmed and matched
//! case-insensitively against the alias table below; unknown headers are
//! ignored.

use super::SourceKind;

/// Canonical snapshot columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    ParticipantId,
    DisplayName,
    Power,
    KillPoints,
    Deaths,
    Tier4Kills,
    Tier5Kills,
    RequiredKills,
    RequiredDeaths,
}

const ALIASES: &[(Column, &[&str])] = &[
    (
        Column::ParticipantId,
        &["governor id", "id", "player id", "participant_id", "participant id", "id губернатора"],
    ),
    (
        Column::DisplayName,
        &["governor name", "name", "display_name", "display name", "имя губернатора", "имя"],
    ),
    (Column::Power, &["power", "мощь"]),
    (Column::KillPoints, &["kill points", "kill_points", "kp", "очки убийств"]),
    (
        Column::Deaths,
        &["deads", "deaths", "dead troops", "погибшие войска", "смерти"],
    ),
    (
        Column::Tier4Kills,
        &["t4 kills", "tier 4 kills", "tier4_kills", "убийства т4"],
    ),
    (
        Column::Tier5Kills,
        &["t5 kills", "tier 5 kills", "tier5_kills", "убийства т5"],
    ),
    (
        Column::RequiredKills,
        &["required kills", "required_kills", "req kills"],
    ),
    (
        Column::RequiredDeaths,
        &["required deaths", "required deads", "required_deaths", "req deaths"],
    ),
];

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::ParticipantId => "participant_id",
            Column::DisplayName => "display_name",
            Column::Power => "power",
            Column::KillPoints => "kill_points",
            Column::Deaths => "deaths",
            Column::Tier4Kills => "tier4_kills",
            Column::Tier5Kills => "tier5_kills",
            Column::RequiredKills => "required_kills",
            Column::RequiredDeaths => "required_deaths",
        }
    }

    /// Resolve a raw header to its canonical column.
    pub fn resolve(header: &str) -> Option<Column> {
        let needle = header.trim().to_lowercase();
        ALIASES
            .iter()
            .find(|(_, aliases)| aliases.iter().any(|a| *a == needle))
            .map(|(column, _)| *column)
    }
}

/// Columns a source of the given kind must provide.
pub fn required_columns(kind: SourceKind) -> &'static [Column] {
    const METRICS: &[Column] = &[
        Column::ParticipantId,
        Column::KillPoints,
        Column::Deaths,
        Column::Tier4Kills,
        Column::Tier5Kills,
        Column::Power,
    ];
    match kind {
        SourceKind::Roster => &[Column::ParticipantId, Column::Power],
        SourceKind::Before | SourceKind::PeriodStart | SourceKind::PeriodEnd => METRICS,
        SourceKind::After => &[
            Column::ParticipantId,
            Column::DisplayName,
            Column::KillPoints,
            Column::Deaths,
            Column::Tier4Kills,
            Column::Tier5Kills,
            Column::Power,
        ],
        SourceKind::Requirements => &[
            Column::ParticipantId,
            Column::RequiredKills,
            Column::RequiredDeaths,
        ],
    }
}

/// Header position of every canonical column found in a table.
///
/// When two headers alias the same column, the leftmost one wins.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    positions: Vec<(Column, usize)>,
}

impl ColumnMap {
    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> Self {
        let mut positions: Vec<(Column, usize)> = Vec::new();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(column) = Column::resolve(header.as_ref()) {
                if !positions.iter().any(|(c, _)| *c == column) {
                    positions.push((column, idx));
                }
            }
        }
        Self { positions }
    }

    pub fn position(&self, column: Column) -> Option<usize> {
        self.positions
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, idx)| *idx)
    }

    /// First required column that could not be resolved.
    pub fn first_missing(&self, kind: SourceKind) -> Option<Column> {
        required_columns(kind)
            .iter()
            .copied()
            .find(|c| self.position(*c).is_none())
    }
}
