//! Presence/absence matrices (PAMs) and biodiversity statistics.
//!
//! A PAM marks a species present at a site when its occurrence count there reaches a minimum
//! presence count. Statistics follow the usual macroecology notation:
//!
//! * alpha: species richness of a site
//! * omega: range size of a species, the number of sites where it is present
//! * gamma: number of species present at any site
//! * phi: range size of the species present at a site, summed
//! * psi: richness of the sites where a species is present, summed
//!
//! Sites with no present species do not count as occupied and are excluded from the
//! denominators of proportional measures.

use std::path::{Path, PathBuf};

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::archive::{self, Archive, ArchiveMetadata, MatrixParts, METADATA_ENTRY};
use crate::error::SpnetError;
use crate::heatmap::{HeatmapMatrix, MatrixInfo};
use crate::models::{Axis, Compression};
use crate::table::{TableKind, SPECIES_COUNT_FLD};
use crate::types::LabelIndex;

const SITE_STATS_ENTRY: &str = "site_stats.json";
const SPECIES_STATS_ENTRY: &str = "species_stats.json";
const DIVERSITY_STATS_ENTRY: &str = "diversity_stats.json";

/// Statistics of one site (matrix row).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SiteMeasures {
    pub site: String,
    /// Number of species present
    pub alpha: u64,
    /// alpha / gamma
    pub alpha_proportional: f64,
    /// gamma / alpha; 0 for unoccupied sites
    pub beta: f64,
    /// Sum of the ranges of the species present
    pub phi: u64,
    /// phi / (occupied sites * alpha); 0 for unoccupied sites
    pub phi_average_proportional: f64,
}

/// Statistics of one species (matrix column).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SpeciesMeasures {
    pub species: String,
    /// Number of sites where the species is present
    pub omega: u64,
    /// omega / occupied sites
    pub omega_proportional: f64,
    /// Sum of the richness of the sites where the species is present
    pub psi: u64,
    /// psi / (gamma * omega); 0 for absent species
    pub psi_average_proportional: f64,
}

/// Statistics of every site of a PAM, in row order.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SiteStatistics {
    pub sites: Vec<SiteMeasures>,
}

impl SiteStatistics {
    /// Statistics of a site, if present.
    pub fn get(&self, site: &str) -> Option<&SiteMeasures> {
        self.sites.iter().find(|measures| measures.site == site)
    }
}

/// Statistics of every species of a PAM, in column order.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SpeciesStatistics {
    pub species: Vec<SpeciesMeasures>,
}

impl SpeciesStatistics {
    /// Statistics of a species, if present.
    pub fn get(&self, species: &str) -> Option<&SpeciesMeasures> {
        self.species
            .iter()
            .find(|measures| measures.species == species)
    }
}

/// Whole-matrix diversity statistics.
///
/// Beta diversity is reported three ways, with mean richness ᾱ = presences / occupied sites:
/// Whittaker's multiplicative `gamma / ᾱ`, Lande's additive `gamma - ᾱ` and Legendre's total
/// variance `Σ omega - Σ omega² / occupied sites`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DiversityStatistics {
    pub site_count: usize,
    pub species_count: usize,
    pub occupied_sites: u64,
    pub gamma: u64,
    pub total_presences: u64,
    pub mean_site_richness: f64,
    pub mean_species_range: f64,
    pub whittaker_beta: f64,
    pub lande_beta: f64,
    pub legendre_beta: f64,
}

/// Divide, returning 0 for a zero denominator.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Presence/absence matrix derived from a heatmap.
#[derive(Clone, Debug, PartialEq)]
pub struct Pam {
    info: MatrixInfo,
    min_presence_count: u64,
    rows: LabelIndex,
    columns: LabelIndex,
    /// Offset of each row's first present cell; `rows.len() + 1` entries.
    row_offsets: Vec<usize>,
    /// Column indices of present cells, ascending within each row.
    column_indices: Vec<u32>,
    site_stats: Option<SiteStatistics>,
    species_stats: Option<SpeciesStatistics>,
    diversity_stats: Option<DiversityStatistics>,
}

/// Threshold a heatmap into a PAM.
pub fn build_pam(heatmap: &HeatmapMatrix, min_presence_count: u64) -> Result<Pam, SpnetError> {
    Pam::from_heatmap(heatmap, min_presence_count)
}

impl Pam {
    /// Threshold a heatmap into a PAM.
    ///
    /// A cell is present when its value is at least `min_presence_count`, which must be at least
    /// 1. Labels of both axes are kept, including those of empty rows and columns.
    #[tracing::instrument(level = "DEBUG", skip(heatmap), fields(table_type = %heatmap.table_type()))]
    pub fn from_heatmap(heatmap: &HeatmapMatrix, min_presence_count: u64) -> Result<Self, SpnetError> {
        if min_presence_count < 1 {
            return Err(SpnetError::Threshold { min_presence_count });
        }
        if heatmap.is_empty() {
            return Err(SpnetError::EmptyMatrix {
                operation: "presence thresholding",
            });
        }
        let table_type = heatmap.table_type().with_kind(TableKind::Pam)?;
        let info = MatrixInfo::new(table_type, heatmap.datestr(), SPECIES_COUNT_FLD);
        let (n_rows, _) = heatmap.shape();
        let mut row_offsets = Vec::with_capacity(n_rows + 1);
        let mut column_indices = Vec::new();
        row_offsets.push(0);
        for r in 0..n_rows {
            for (c, value) in heatmap.row(r) {
                if value >= min_presence_count {
                    column_indices.push(u32::try_from(c)?);
                }
            }
            row_offsets.push(column_indices.len());
        }
        Ok(Pam {
            info,
            min_presence_count,
            rows: heatmap.labels(Axis::Row).clone(),
            columns: heatmap.labels(Axis::Column).clone(),
            row_offsets,
            column_indices,
            site_stats: None,
            species_stats: None,
            diversity_stats: None,
        })
    }

    /// PAM metadata.
    pub fn info(&self) -> &MatrixInfo {
        &self.info
    }

    /// Threshold used to build the PAM.
    pub fn min_presence_count(&self) -> u64 {
        self.min_presence_count
    }

    pub fn row_categories(&self) -> &[String] {
        self.rows.as_slice()
    }

    pub fn column_categories(&self) -> &[String] {
        self.columns.as_slice()
    }

    /// Number of sites and species.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    /// Number of present cells.
    pub fn presence_count(&self) -> usize {
        self.column_indices.len()
    }

    /// Whether a species is present at a site; `None` if either label does not exist.
    pub fn is_present(&self, site: &str, species: &str) -> Option<bool> {
        let row = self.rows.position(site)?;
        let column = u32::try_from(self.columns.position(species)?).ok()?;
        Some(self.present_columns(row).binary_search(&column).is_ok())
    }

    fn present_columns(&self, row: usize) -> &[u32] {
        &self.column_indices[self.row_offsets[row]..self.row_offsets[row + 1]]
    }

    /// Present cells as (row index, column index), in row-major order.
    pub fn iter_present(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.rows.len()).flat_map(move |r| {
            self.present_columns(r)
                .iter()
                .map(move |c| (r, *c as usize))
        })
    }

    /// Species richness (alpha) of every site.
    pub fn richness(&self) -> Array1<u64> {
        self.row_offsets
            .windows(2)
            .map(|pair| (pair[1] - pair[0]) as u64)
            .collect()
    }

    /// Range size (omega) of every species.
    pub fn ranges(&self) -> Array1<u64> {
        let mut ranges = Array1::zeros(self.columns.len());
        for c in &self.column_indices {
            ranges[*c as usize] += 1;
        }
        ranges
    }

    /// Number of sites with at least one present species.
    fn occupied_sites(alpha: &Array1<u64>) -> u64 {
        alpha.iter().filter(|a| **a > 0).count() as u64
    }

    /// Number of species present at one site or more.
    fn gamma(omega: &Array1<u64>) -> u64 {
        omega.iter().filter(|o| **o > 0).count() as u64
    }

    /// Compute per-site statistics, storing them on the PAM.
    pub fn calc_site_stats(&mut self) -> &SiteStatistics {
        let alpha = self.richness();
        let omega = self.ranges();
        let gamma = Self::gamma(&omega) as f64;
        let occupied = Self::occupied_sites(&alpha) as f64;
        let sites = self
            .rows
            .as_slice()
            .iter()
            .enumerate()
            .map(|(r, site)| {
                let a = alpha[r];
                let phi: u64 = self
                    .present_columns(r)
                    .iter()
                    .map(|c| omega[*c as usize])
                    .sum();
                SiteMeasures {
                    site: site.clone(),
                    alpha: a,
                    alpha_proportional: ratio(a as f64, gamma),
                    beta: ratio(gamma, a as f64),
                    phi,
                    phi_average_proportional: ratio(phi as f64, occupied * a as f64),
                }
            })
            .collect();
        self.site_stats.insert(SiteStatistics { sites })
    }

    /// Compute per-species statistics, storing them on the PAM.
    pub fn calc_species_stats(&mut self) -> &SpeciesStatistics {
        let alpha = self.richness();
        let omega = self.ranges();
        let gamma = Self::gamma(&omega) as f64;
        let occupied = Self::occupied_sites(&alpha) as f64;
        let mut psi = Array1::<u64>::zeros(self.columns.len());
        for (r, c) in self.iter_present() {
            psi[c] += alpha[r];
        }
        let species = self
            .columns
            .as_slice()
            .iter()
            .enumerate()
            .map(|(c, name)| SpeciesMeasures {
                species: name.clone(),
                omega: omega[c],
                omega_proportional: ratio(omega[c] as f64, occupied),
                psi: psi[c],
                psi_average_proportional: ratio(psi[c] as f64, gamma * omega[c] as f64),
            })
            .collect();
        self.species_stats.insert(SpeciesStatistics { species })
    }

    /// Compute whole-matrix diversity statistics, storing them on the PAM.
    pub fn calc_diversity_stats(&mut self) -> &DiversityStatistics {
        let alpha = self.richness();
        let omega = self.ranges();
        let (site_count, species_count) = self.shape();
        let gamma = Self::gamma(&omega);
        let occupied_sites = Self::occupied_sites(&alpha);
        let total_presences = self.presence_count() as u64;
        let mean_alpha = ratio(total_presences as f64, occupied_sites as f64);
        let omega = omega.mapv(|o| o as f64);
        let (whittaker_beta, lande_beta, legendre_beta) = if total_presences == 0 {
            (0.0, 0.0, 0.0)
        } else {
            (
                gamma as f64 / mean_alpha,
                gamma as f64 - mean_alpha,
                omega.sum() - omega.mapv(|o| o * o).sum() / occupied_sites as f64,
            )
        };
        self.diversity_stats.insert(DiversityStatistics {
            site_count,
            species_count,
            occupied_sites,
            gamma,
            total_presences,
            mean_site_richness: ratio(total_presences as f64, site_count as f64),
            mean_species_range: ratio(total_presences as f64, species_count as f64),
            whittaker_beta,
            lande_beta,
            legendre_beta,
        })
    }

    /// Compute all statistics.
    pub fn calc_all_stats(&mut self) {
        self.calc_site_stats();
        self.calc_species_stats();
        self.calc_diversity_stats();
    }

    pub fn site_stats(&self) -> Option<&SiteStatistics> {
        self.site_stats.as_ref()
    }

    pub fn species_stats(&self) -> Option<&SpeciesStatistics> {
        self.species_stats.as_ref()
    }

    pub fn diversity_stats(&self) -> Option<&DiversityStatistics> {
        self.diversity_stats.as_ref()
    }

    /// Collect the statistics computed so far for persistence.
    pub fn statistics(&self) -> Result<PamStatistics, SpnetError> {
        let table_type = self.info.table_type.with_kind(TableKind::Stats)?;
        let info = MatrixInfo::new(table_type, &self.info.datestr, &self.info.value_fld);
        Ok(PamStatistics {
            metadata: ArchiveMetadata::new(&info, Some(self.min_presence_count)),
            site: self.site_stats.clone(),
            species: self.species_stats.clone(),
            diversity: self.diversity_stats.clone(),
        })
    }

    fn metadata(&self) -> ArchiveMetadata {
        ArchiveMetadata::new(&self.info, Some(self.min_presence_count))
    }

    /// Serialise the presence cells to an archive. Statistics are not included.
    pub fn to_archive(&self) -> Result<Archive, SpnetError> {
        let cells = self
            .iter_present()
            .map(|(r, c)| Ok((u32::try_from(r)?, u32::try_from(c)?, 1)))
            .collect::<Result<Vec<_>, SpnetError>>()?;
        MatrixParts::to_archive(
            &self.metadata(),
            self.row_categories(),
            self.column_categories(),
            cells.into_iter(),
        )
    }

    /// Deserialise a PAM from an archive.
    pub fn from_archive(archive: &Archive) -> Result<Self, SpnetError> {
        let parts = MatrixParts::from_archive(archive, TableKind::Pam)?;
        let min_presence_count = parts
            .metadata
            .min_presence_count
            .ok_or_else(|| SpnetError::archive("PAM metadata has no min_presence_count"))?;
        let mut present = Vec::with_capacity(parts.cells.len());
        for (row, column, value) in parts.cells {
            if row as usize >= parts.rows.len() || column as usize >= parts.columns.len() {
                return Err(SpnetError::archive(format!(
                    "cell ({}, {}) out of bounds",
                    row, column
                )));
            }
            if value != 1 {
                return Err(SpnetError::archive(format!(
                    "PAM cell ({}, {}) has value {}",
                    row, column, value
                )));
            }
            present.push((row, column));
        }
        present.sort_unstable();
        if present.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(SpnetError::archive("duplicate cell"));
        }
        let mut row_offsets = vec![0; parts.rows.len() + 1];
        for (row, _) in &present {
            row_offsets[*row as usize + 1] += 1;
        }
        for r in 0..parts.rows.len() {
            row_offsets[r + 1] += row_offsets[r];
        }
        Ok(Pam {
            info: parts.metadata.info(),
            min_presence_count,
            rows: parts.rows,
            columns: parts.columns,
            row_offsets,
            column_indices: present.into_iter().map(|(_, c)| c).collect(),
            site_stats: None,
            species_stats: None,
            diversity_stats: None,
        })
    }

    /// Write the PAM archive to a directory, returning its path.
    pub fn write_to_dir(&self, dir: &Path, compression: Compression) -> Result<PathBuf, SpnetError> {
        archive::write_to_dir(&self.to_archive()?, &self.metadata(), dir, compression)
    }

    /// Read a PAM archive file.
    pub fn read_from_file(path: &Path) -> Result<Self, SpnetError> {
        Self::from_archive(&Archive::read_file(path)?)
    }
}

/// Statistics computed from a PAM, as persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct PamStatistics {
    pub metadata: ArchiveMetadata,
    pub site: Option<SiteStatistics>,
    pub species: Option<SpeciesStatistics>,
    pub diversity: Option<DiversityStatistics>,
}

impl PamStatistics {
    /// Serialise the statistics to an archive. At least one kind of statistics is required.
    pub fn to_archive(&self) -> Result<Archive, SpnetError> {
        if self.site.is_none() && self.species.is_none() && self.diversity.is_none() {
            return Err(SpnetError::EmptyMatrix {
                operation: "statistics persistence without computed statistics",
            });
        }
        let mut archive = Archive::new();
        archive.insert_json(METADATA_ENTRY, &self.metadata)?;
        if let Some(site) = &self.site {
            archive.insert_json(SITE_STATS_ENTRY, site)?;
        }
        if let Some(species) = &self.species {
            archive.insert_json(SPECIES_STATS_ENTRY, species)?;
        }
        if let Some(diversity) = &self.diversity {
            archive.insert_json(DIVERSITY_STATS_ENTRY, diversity)?;
        }
        Ok(archive)
    }

    /// Deserialise statistics from an archive.
    pub fn from_archive(archive: &Archive) -> Result<Self, SpnetError> {
        let metadata = ArchiveMetadata::read(archive, TableKind::Stats)?;
        let stats = PamStatistics {
            metadata,
            site: archive.json_opt(SITE_STATS_ENTRY)?,
            species: archive.json_opt(SPECIES_STATS_ENTRY)?,
            diversity: archive.json_opt(DIVERSITY_STATS_ENTRY)?,
        };
        if stats.site.is_none() && stats.species.is_none() && stats.diversity.is_none() {
            return Err(SpnetError::archive("no statistics entries"));
        }
        Ok(stats)
    }

    /// Write the statistics archive to a directory, returning its path.
    pub fn write_to_dir(&self, dir: &Path, compression: Compression) -> Result<PathBuf, SpnetError> {
        archive::write_to_dir(&self.to_archive()?, &self.metadata, dir, compression)
    }

    /// Read a statistics archive file.
    pub fn read_from_file(path: &Path) -> Result<Self, SpnetError> {
        Self::from_archive(&Archive::read_file(path)?)
    }
}
