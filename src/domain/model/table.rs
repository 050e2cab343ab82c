//! Closed set of submittable tables.

use std::fmt;
use std::str::FromStr;

/// Sequencing technology shared by an experiment table and its aligned table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SequencingKind {
    DnaShortRead,
    RnaShortRead,
    Nanopore,
    PacBio,
}

impl SequencingKind {
    pub const ALL: [SequencingKind; 4] = [
        SequencingKind::DnaShortRead,
        SequencingKind::RnaShortRead,
        SequencingKind::Nanopore,
        SequencingKind::PacBio,
    ];
}

/// Every table the submission engine accepts records for.
///
/// Each variant carries its own schema name, primary key field, normalizer
/// (see [`crate::domain::normalize`]) and relational configuration
/// (see [`crate::domain::model::registry`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    Participant,
    Family,
    Analyte,
    Phenotype,
    GeneticFindings,
    Biobank,
    /// Parent index row written alongside every `experiment_*` record.
    ExperimentIndex,
    /// Parent index row written alongside every `aligned_*` record.
    AlignedIndex,
    Experiment(SequencingKind),
    Aligned(SequencingKind),
}

impl TableKind {
    pub const ALL: [TableKind; 16] = [
        TableKind::Participant,
        TableKind::Family,
        TableKind::Analyte,
        TableKind::Phenotype,
        TableKind::GeneticFindings,
        TableKind::Biobank,
        TableKind::ExperimentIndex,
        TableKind::AlignedIndex,
        TableKind::Experiment(SequencingKind::DnaShortRead),
        TableKind::Experiment(SequencingKind::RnaShortRead),
        TableKind::Experiment(SequencingKind::Nanopore),
        TableKind::Experiment(SequencingKind::PacBio),
        TableKind::Aligned(SequencingKind::DnaShortRead),
        TableKind::Aligned(SequencingKind::RnaShortRead),
        TableKind::Aligned(SequencingKind::Nanopore),
        TableKind::Aligned(SequencingKind::PacBio),
    ];

    /// Table name as used in URLs, schema file names and storage rows.
    pub fn name(&self) -> &'static str {
        use SequencingKind::*;
        match self {
            TableKind::Participant => "participant",
            TableKind::Family => "family",
            TableKind::Analyte => "analyte",
            TableKind::Phenotype => "phenotype",
            TableKind::GeneticFindings => "genetic_findings",
            TableKind::Biobank => "biobank",
            TableKind::ExperimentIndex => "experiment",
            TableKind::AlignedIndex => "aligned",
            TableKind::Experiment(DnaShortRead) => "experiment_dna_short_read",
            TableKind::Experiment(RnaShortRead) => "experiment_rna_short_read",
            TableKind::Experiment(Nanopore) => "experiment_nanopore",
            TableKind::Experiment(PacBio) => "experiment_pac_bio",
            TableKind::Aligned(DnaShortRead) => "aligned_dna_short_read",
            TableKind::Aligned(RnaShortRead) => "aligned_rna_short_read",
            TableKind::Aligned(Nanopore) => "aligned_nanopore",
            TableKind::Aligned(PacBio) => "aligned_pac_bio",
        }
    }

    /// Name of the schema document validating this table.
    pub fn schema_name(&self) -> &'static str {
        self.name()
    }

    /// Natural primary key field (`{table}_id` for every table).
    pub fn primary_key_field(&self) -> &'static str {
        use SequencingKind::*;
        match self {
            TableKind::Participant => "participant_id",
            TableKind::Family => "family_id",
            TableKind::Analyte => "analyte_id",
            TableKind::Phenotype => "phenotype_id",
            TableKind::GeneticFindings => "genetic_findings_id",
            TableKind::Biobank => "biobank_id",
            TableKind::ExperimentIndex => "experiment_id",
            TableKind::AlignedIndex => "aligned_id",
            TableKind::Experiment(DnaShortRead) => "experiment_dna_short_read_id",
            TableKind::Experiment(RnaShortRead) => "experiment_rna_short_read_id",
            TableKind::Experiment(Nanopore) => "experiment_nanopore_id",
            TableKind::Experiment(PacBio) => "experiment_pac_bio_id",
            TableKind::Aligned(DnaShortRead) => "aligned_dna_short_read_id",
            TableKind::Aligned(RnaShortRead) => "aligned_rna_short_read_id",
            TableKind::Aligned(Nanopore) => "aligned_nanopore_id",
            TableKind::Aligned(PacBio) => "aligned_pac_bio_id",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        TableKind::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableKind::from_name(s).ok_or_else(|| format!("Table '{}' is not supported", s.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for table in TableKind::ALL {
            assert_eq!(TableKind::from_name(table.name()), Some(table));
            assert!(table.primary_key_field().starts_with(table.name()));
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!(TableKind::from_name("users"), None);
        assert!("users".parse::<TableKind>().is_err());
        assert_eq!(" Family ".parse::<TableKind>(), Ok(TableKind::Family));
    }
}
