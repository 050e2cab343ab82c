//! Relational configuration for each table: lookup sub-entities, foreign keys
//! checked at persistence time, and parent index tables.

use crate::domain::model::TableKind;

/// Auxiliary lookup tables whose rows are created on first reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LookupTable {
    InternalProjectId,
    PmidId,
    TwinId,
    ExperimentId,
    AlignedId,
    /// Families are full records; a reference creates a minimal `family` row.
    Family,
}

impl LookupTable {
    pub fn name(&self) -> &'static str {
        match self {
            LookupTable::InternalProjectId => "internal_project_id",
            LookupTable::PmidId => "pmid_id",
            LookupTable::TwinId => "twin_id",
            LookupTable::ExperimentId => "experiment_id",
            LookupTable::AlignedId => "aligned_id",
            LookupTable::Family => "family",
        }
    }

    /// Field holding the natural key of a lookup row.
    pub fn natural_key_field(&self) -> &'static str {
        match self {
            LookupTable::Family => "family_id",
            other => other.name(),
        }
    }
}

/// A record field whose value(s) name rows of a lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubEntityRef {
    pub field: &'static str,
    pub lookup: LookupTable,
}

/// A record field whose value(s) must name an existing row of `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub field: &'static str,
    pub target: TableKind,
}

const PARTICIPANT_SUB_ENTITIES: &[SubEntityRef] = &[
    SubEntityRef { field: "family_id", lookup: LookupTable::Family },
    SubEntityRef { field: "internal_project_id", lookup: LookupTable::InternalProjectId },
    SubEntityRef { field: "pmid_id", lookup: LookupTable::PmidId },
    SubEntityRef { field: "twin_id", lookup: LookupTable::TwinId },
];

const BIOBANK_SUB_ENTITIES: &[SubEntityRef] = &[
    SubEntityRef { field: "experiment_id", lookup: LookupTable::ExperimentId },
    SubEntityRef { field: "aligned_id", lookup: LookupTable::AlignedId },
];

const PARTICIPANT_FK: ForeignKey = ForeignKey {
    field: "participant_id",
    target: TableKind::Participant,
};

impl TableKind {
    /// Lookup references resolved (get-or-create) before persistence.
    pub fn sub_entity_refs(&self) -> &'static [SubEntityRef] {
        match self {
            TableKind::Participant => PARTICIPANT_SUB_ENTITIES,
            TableKind::Biobank => BIOBANK_SUB_ENTITIES,
            _ => &[],
        }
    }

    /// Relations the store enforces when a row is written.
    pub fn foreign_keys(&self) -> Vec<ForeignKey> {
        match self {
            TableKind::Participant | TableKind::Family => Vec::new(),
            TableKind::Analyte
            | TableKind::Phenotype
            | TableKind::Biobank
            | TableKind::ExperimentIndex
            | TableKind::AlignedIndex => vec![PARTICIPANT_FK],
            TableKind::GeneticFindings => vec![
                PARTICIPANT_FK,
                ForeignKey {
                    field: "additional_family_members_with_variant",
                    target: TableKind::Participant,
                },
            ],
            TableKind::Experiment(_) => vec![ForeignKey {
                field: "analyte_id",
                target: TableKind::Analyte,
            }],
            TableKind::Aligned(kind) => {
                let experiment = TableKind::Experiment(*kind);
                vec![ForeignKey {
                    field: experiment.primary_key_field(),
                    target: experiment,
                }]
            }
        }
    }

    /// Foreign keys of other tables that point at this one, with the owning table.
    pub fn dependents(&self) -> Vec<(TableKind, ForeignKey)> {
        TableKind::ALL
            .into_iter()
            .flat_map(|owner| {
                owner
                    .foreign_keys()
                    .into_iter()
                    .filter(|fk| fk.target == *self)
                    .map(move |fk| (owner, fk))
            })
            .collect()
    }

    /// Index table that gets a row alongside every record of this table.
    pub fn parent_index(&self) -> Option<TableKind> {
        match self {
            TableKind::Experiment(_) => Some(TableKind::ExperimentIndex),
            TableKind::Aligned(_) => Some(TableKind::AlignedIndex),
            _ => None,
        }
    }

    /// Identifier of this table's row in its parent index (`{table}.{id}`).
    pub fn index_row_id(&self, identifier: &str) -> String {
        format!("{}.{}", self.name(), identifier)
    }
}
