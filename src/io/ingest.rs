//! CSV ingest and normalization.
//!
//! Three inputs feed a run:
//!
//! - marginals, long format: `geography,variable,category,count`
//! - microdata: `serial_no,region,size,age,income,race,ethnicity` (category labels)
//! - crosswalk: `geography,region`
//!
//! Missing required columns are fatal. Problems confined to one row are recorded
//! as `RowError`s and the row is skipped, so a handful of bad lines never sinks a
//! state-sized run.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use tracing::{info, warn};

use crate::domain::{CategoryScheme, Geography, Marginals, MicrodataRecord, RegionId, Variable};
use crate::error::SynthError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Which input the row came from (`marginals`, `microdata`, `crosswalk`).
    pub source: &'static str,
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// Geographies parsed from the marginals file, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct MarginalsData {
    pub geographies: Vec<Geography>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MicrodataData {
    pub records: Vec<MicrodataRecord>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Geography to sampling-region lookup.
#[derive(Debug, Clone, Default)]
pub struct Crosswalk {
    regions: BTreeMap<String, RegionId>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

impl Crosswalk {
    pub fn from_pairs<I, G, R>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (G, R)>,
        G: Into<String>,
        R: Into<String>,
    {
        Self {
            regions: pairs
                .into_iter()
                .map(|(g, r)| (g.into(), RegionId::new(r)))
                .collect(),
            ..Self::default()
        }
    }

    pub fn region_of(&self, geography: &str) -> Option<&RegionId> {
        self.regions.get(geography)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Set each geography's region; returns the ids with no crosswalk entry.
    pub fn assign(&self, geographies: &mut [Geography]) -> Vec<String> {
        let mut unmapped = Vec::new();
        for geo in geographies.iter_mut() {
            geo.region = self.region_of(&geo.id).cloned();
            if geo.region.is_none() {
                unmapped.push(geo.id.clone());
            }
        }
        unmapped
    }
}

/// Everything a synthesis run reads from disk.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    pub geographies: Vec<Geography>,
    pub microdata: Vec<MicrodataRecord>,
    pub crosswalk: Crosswalk,
    pub row_errors: Vec<RowError>,
}

impl Inputs {
    pub fn load(
        marginals: &Path,
        microdata: &Path,
        crosswalk: &Path,
        scheme: &CategoryScheme,
    ) -> Result<Self, SynthError> {
        let crosswalk = load_crosswalk(crosswalk)?;
        let marginals = load_marginals(marginals, scheme)?;
        let microdata = load_microdata(microdata, scheme)?;

        let mut row_errors = Vec::new();
        row_errors.extend(crosswalk.row_errors.iter().cloned());
        row_errors.extend(marginals.row_errors);
        row_errors.extend(microdata.row_errors);

        info!(
            geographies = marginals.geographies.len(),
            records = microdata.records.len(),
            crosswalk = crosswalk.len(),
            row_errors = row_errors.len(),
            "loaded inputs"
        );

        Ok(Self {
            geographies: marginals.geographies,
            microdata: microdata.records,
            crosswalk,
            row_errors,
        })
    }
}

pub fn load_marginals(path: &Path, scheme: &CategoryScheme) -> Result<MarginalsData, SynthError> {
    read_marginals(open(path)?, scheme)
}

pub fn load_microdata(path: &Path, scheme: &CategoryScheme) -> Result<MicrodataData, SynthError> {
    read_microdata(open(path)?, scheme)
}

pub fn load_crosswalk(path: &Path) -> Result<Crosswalk, SynthError> {
    read_crosswalk(open(path)?)
}

/// Parse long-format marginals. Variables with no rows for a geography become
/// all-zero vectors and are reported.
pub fn read_marginals<R: Read>(reader: R, scheme: &CategoryScheme) -> Result<MarginalsData, SynthError> {
    const SOURCE: &str = "marginals";
    let (mut reader, header_map) = csv_reader(reader, SOURCE)?;
    ensure_columns(&header_map, SOURCE, &["geography", "variable", "category", "count"])?;

    struct Pending {
        first_line: usize,
        vectors: [Option<Vec<f64>>; Variable::COUNT],
    }

    let mut order: Vec<String> = Vec::new();
    let mut pending: HashMap<String, Pending> = HashMap::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(row_error(SOURCE, line, None, format!("CSV parse error: {e}")));
                continue;
            }
        };

        let parsed = (|| -> Result<(String, Variable, usize, f64), (Option<String>, String)> {
            let geography = get_required(&record, &header_map, "geography").map_err(|e| (None, e))?;
            let fail = |msg: String| (Some(geography.to_string()), msg);

            let raw_var = get_required(&record, &header_map, "variable").map_err(fail)?;
            let variable = Variable::parse(raw_var).ok_or_else(|| fail(format!("unknown variable `{raw_var}`")))?;
            let raw_cat = get_required(&record, &header_map, "category").map_err(fail)?;
            let category = scheme
                .get(variable)
                .index_of(raw_cat)
                .ok_or_else(|| fail(format!("unknown `{variable}` category `{raw_cat}`")))?;
            let raw_count = get_required(&record, &header_map, "count").map_err(fail)?;
            let count = parse_count(raw_count).map_err(fail)?;
            Ok((geography.to_string(), variable, category, count))
        })();

        let (geography, variable, category, count) = match parsed {
            Ok(v) => v,
            Err((id, message)) => {
                row_errors.push(row_error(SOURCE, line, id, message));
                continue;
            }
        };

        let entry = pending.entry(geography.clone()).or_insert_with(|| {
            order.push(geography.clone());
            Pending {
                first_line: line,
                vectors: Default::default(),
            }
        });
        let vector = entry.vectors[variable.axis()].get_or_insert_with(|| vec![0.0; scheme.get(variable).len()]);
        vector[category] += count;
    }

    let mut geographies = Vec::with_capacity(order.len());
    for id in order {
        let Some(Pending { first_line, vectors }) = pending.remove(&id) else {
            continue;
        };
        let mut filled: [Vec<f64>; Variable::COUNT] = Default::default();
        for (variable, vector) in Variable::ALL.into_iter().zip(vectors) {
            filled[variable.axis()] = match vector {
                Some(v) => v,
                None => {
                    row_errors.push(row_error(
                        SOURCE,
                        first_line,
                        Some(id.clone()),
                        format!("no `{variable}` marginal; treated as all zeros"),
                    ));
                    vec![0.0; scheme.get(variable).len()]
                }
            };
        }
        match Marginals::new(filled) {
            Ok(marginals) => geographies.push(Geography {
                id,
                region: None,
                marginals,
            }),
            Err(e) => row_errors.push(row_error(SOURCE, first_line, Some(id), e.to_string())),
        }
    }

    if !row_errors.is_empty() {
        warn!(count = row_errors.len(), "marginals rows skipped or patched");
    }

    Ok(MarginalsData {
        geographies,
        row_errors,
        rows_read,
    })
}

pub fn read_microdata<R: Read>(reader: R, scheme: &CategoryScheme) -> Result<MicrodataData, SynthError> {
    const SOURCE: &str = "microdata";
    let (mut reader, header_map) = csv_reader(reader, SOURCE)?;
    let mut required = vec!["serial_no", "region"];
    required.extend(Variable::ALL.iter().map(|v| v.name()));
    ensure_columns(&header_map, SOURCE, &required)?;

    let mut records = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(row_error(SOURCE, line, None, format!("CSV parse error: {e}")));
                continue;
            }
        };

        let parsed = (|| -> Result<MicrodataRecord, (Option<String>, String)> {
            let serial_no = get_required(&record, &header_map, "serial_no").map_err(|e| (None, e))?;
            let fail = |msg: String| (Some(serial_no.to_string()), msg);
            let region = get_required(&record, &header_map, "region").map_err(fail)?;

            let mut labels = [""; Variable::COUNT];
            for variable in Variable::ALL {
                labels[variable.axis()] = get_required(&record, &header_map, variable.name()).map_err(fail)?;
            }
            let combo = scheme.parse_combo(labels).map_err(fail)?;

            Ok(MicrodataRecord {
                serial_no: serial_no.to_string(),
                region: RegionId::new(region),
                combo,
            })
        })();

        match parsed {
            Ok(r) => records.push(r),
            Err((id, message)) => row_errors.push(row_error(SOURCE, line, id, message)),
        }
    }

    if !row_errors.is_empty() {
        warn!(count = row_errors.len(), "microdata rows skipped");
    }

    Ok(MicrodataData {
        records,
        row_errors,
        rows_read,
    })
}

pub fn read_crosswalk<R: Read>(reader: R) -> Result<Crosswalk, SynthError> {
    const SOURCE: &str = "crosswalk";
    let (mut reader, header_map) = csv_reader(reader, SOURCE)?;
    ensure_columns(&header_map, SOURCE, &["geography", "region"])?;

    let mut crosswalk = Crosswalk::default();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        crosswalk.rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                crosswalk
                    .row_errors
                    .push(row_error(SOURCE, line, None, format!("CSV parse error: {e}")));
                continue;
            }
        };

        let geography = match get_required(&record, &header_map, "geography") {
            Ok(g) => g.to_string(),
            Err(e) => {
                crosswalk.row_errors.push(row_error(SOURCE, line, None, e));
                continue;
            }
        };
        let region = match get_required(&record, &header_map, "region") {
            Ok(r) => RegionId::new(r),
            Err(e) => {
                crosswalk.row_errors.push(row_error(SOURCE, line, Some(geography), e));
                continue;
            }
        };

        match crosswalk.regions.get(&geography) {
            Some(existing) if *existing != region => {
                let message = format!("geography already mapped to region {existing}; ignoring {region}");
                crosswalk.row_errors.push(row_error(SOURCE, line, Some(geography), message));
            }
            Some(_) => {}
            None => {
                crosswalk.regions.insert(geography, region);
            }
        }
    }

    Ok(crosswalk)
}

fn open(path: &Path) -> Result<File, SynthError> {
    File::open(path).map_err(|e| SynthError::InvalidInput(format!("failed to open '{}': {e}", path.display())))
}

fn csv_reader<R: Read>(
    reader: R,
    source: &str,
) -> Result<(csv::Reader<R>, HashMap<String, usize>), SynthError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| SynthError::InvalidInput(format!("failed to read {source} CSV headers: {e}")))?
        .clone();

    let header_map = build_header_map(&headers);
    Ok((reader, header_map))
}

fn ensure_columns(header_map: &HashMap<String, usize>, source: &str, names: &[&str]) -> Result<(), SynthError> {
    for name in names {
        if !header_map.contains_key(*name) {
            return Err(SynthError::InvalidInput(format!(
                "{source} CSV is missing required column `{name}`"
            )));
        }
    }
    Ok(())
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn parse_count(s: &str) -> Result<f64, String> {
    let v = s
        .parse::<f64>()
        .map_err(|_| format!("invalid count '{s}'"))?;
    if v.is_finite() && v >= 0.0 {
        Ok(v)
    } else {
        Err(format!("count must be finite and >= 0, got {s}"))
    }
}

fn row_error(source: &'static str, line: usize, id: Option<String>, message: String) -> RowError {
    RowError {
        source,
        line,
        id,
        message,
    }
}
