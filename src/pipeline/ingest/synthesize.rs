use std::collections::HashMap;

use super::loader::DiseaseTables;
use super::types::{cell, DiseaseRecord, Passage, PassageKind, PassageMetadata, Record, Table};
use super::IngestError;

/// Rendered in place of an empty symptom, precaution or description section.
pub const NOT_SPECIFIED: &str = "Not specified";

/// Source label attached to every disease passage.
pub const DISEASE_SOURCE: &str = "disease_database";

/// Rendered in place of a missing region or area cell.
const UNKNOWN_LOCATION: &str = "Unknown";

const DISEASE_COLUMN: &str = "Disease";
const DESCRIPTION_COLUMN: &str = "Description";
const REGION_COLUMN: &str = "States/UTs";
const AREA_COLUMN: &str = "Area";

fn required_column(table: &Table, column: &str) -> Result<usize, IngestError> {
    table.column(column).ok_or_else(|| IngestError::MissingColumn {
        column: column.to_string(),
        table: table.name.clone(),
    })
}

/// Group the repeatable columns (headers containing `needle`) by disease.
///
/// Values are collected row by row, left to right. Missing cells are skipped
/// and repeats are dropped, keeping first appearance order. Rows without a
/// disease name are ignored.
pub fn aggregate_by_disease(
    table: &Table,
    needle: &str,
) -> Result<HashMap<String, Vec<String>>, IngestError> {
    let key_idx = required_column(table, DISEASE_COLUMN)?;
    let value_cols = table.columns_containing(needle);

    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for row in &table.rows {
        let Some(disease) = cell(row, key_idx) else {
            continue;
        };
        let values = grouped.entry(disease.to_string()).or_default();
        for &col in &value_cols {
            if let Some(value) = cell(row, col) {
                if !values.iter().any(|v| v == value) {
                    values.push(value.to_string());
                }
            }
        }
    }
    Ok(grouped)
}

/// One record per disease listed in the description table.
///
/// Diseases appear in first-seen order; a repeated description row replaces
/// the earlier description. Diseases that only appear in the symptom or
/// precaution tables are not emitted.
pub fn disease_records(tables: &DiseaseTables) -> Result<Vec<DiseaseRecord>, IngestError> {
    let mut symptoms = aggregate_by_disease(&tables.symptoms, "Symptom")?;
    let mut precautions = aggregate_by_disease(&tables.precautions, "Precaution")?;

    let descriptions = &tables.descriptions;
    let key_idx = required_column(descriptions, DISEASE_COLUMN)?;
    let desc_idx = required_column(descriptions, DESCRIPTION_COLUMN)?;

    let mut order: Vec<(String, Option<String>)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for row in &descriptions.rows {
        let Some(disease) = cell(row, key_idx) else {
            continue;
        };
        let description = cell(row, desc_idx).map(str::to_string);
        match positions.get(disease) {
            Some(&pos) => order[pos].1 = description,
            None => {
                positions.insert(disease.to_string(), order.len());
                order.push((disease.to_string(), description));
            }
        }
    }

    Ok(order
        .into_iter()
        .map(|(name, description)| DiseaseRecord {
            symptoms: symptoms.remove(&name).unwrap_or_default(),
            precautions: precautions.remove(&name).unwrap_or_default(),
            name,
            description,
        })
        .collect())
}

fn join_or_not_specified(values: &[String]) -> String {
    if values.is_empty() {
        NOT_SPECIFIED.to_string()
    } else {
        values.join(", ")
    }
}

pub fn disease_passage(record: &DiseaseRecord) -> Passage {
    let body = format!(
        "Information about {name}:\n\n\
         Description: {description}\n\n\
         Common Symptoms: {symptoms}\n\n\
         Recommended Precautions: {precautions}",
        name = record.name,
        description = record.description.as_deref().unwrap_or(NOT_SPECIFIED),
        symptoms = join_or_not_specified(&record.symptoms),
        precautions = join_or_not_specified(&record.precautions),
    );

    Passage {
        body,
        metadata: PassageMetadata {
            source: DISEASE_SOURCE.to_string(),
            entity_key: record.name.clone(),
            kind: PassageKind::Disease,
        },
    }
}

pub fn disease_passages(tables: &DiseaseTables) -> Result<Vec<Passage>, IngestError> {
    Ok(disease_records(tables)?
        .iter()
        .map(disease_passage)
        .collect())
}

/// Turn vaccination rows into records keyed by "Region (Area)".
/// Rows whose every cell is missing are dropped.
pub fn vaccination_records(table: &Table) -> Vec<Record> {
    let region_idx = table.column(REGION_COLUMN);
    let area_idx = table.column(AREA_COLUMN);

    table
        .rows
        .iter()
        .filter(|row| row.iter().any(Option::is_some))
        .map(|row| {
            let region = region_idx.and_then(|i| cell(row, i)).unwrap_or(UNKNOWN_LOCATION);
            let area = area_idx.and_then(|i| cell(row, i)).unwrap_or(UNKNOWN_LOCATION);

            let attributes = table
                .headers
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != region_idx && Some(*i) != area_idx)
                .filter_map(|(i, header)| cell(row, i).map(|v| (header.clone(), v.to_string())))
                .collect();

            Record {
                key: format!("{region} ({area})"),
                attributes,
            }
        })
        .collect()
}

pub fn vaccination_passage(location: &str, statistic: &str, value: &str, source: &str) -> Passage {
    Passage {
        body: format!("In {location}, the statistic for '{statistic}' is {value}%."),
        metadata: PassageMetadata {
            source: source.to_string(),
            entity_key: location.to_string(),
            kind: PassageKind::Vaccination,
        },
    }
}

/// One passage per non-missing statistic of every non-empty row.
pub fn vaccination_passages(table: &Table, source: &str) -> Vec<Passage> {
    vaccination_records(table)
        .iter()
        .flat_map(|record| {
            record
                .attributes
                .iter()
                .map(move |(statistic, value)| {
                    vaccination_passage(&record.key, statistic, value, source)
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ingest::loader::VACCINATION_HEADERS;

    fn row(cells: &[&str]) -> Vec<Option<String>> {
        cells
            .iter()
            .map(|c| if c.is_empty() { None } else { Some(c.to_string()) })
            .collect()
    }

    fn table(name: &str, headers: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            name,
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter().map(|r| row(r)).collect(),
        )
    }

    fn disease_tables() -> DiseaseTables {
        DiseaseTables {
            symptoms: table(
                "dataset.csv",
                &["Disease", "Symptom_1", "Symptom_2"],
                &[&["Flu", "fever", "cough"], &["Flu", "cough", ""], &["Malaria", "chills", ""]],
            ),
            descriptions: table(
                "symptom_Description.csv",
                &["Disease", "Description"],
                &[
                    &["Flu", "Caused by a virus"],
                    &["Malaria", "Spread by mosquitoes"],
                    &["Migraine", "Recurring headaches"],
                ],
            ),
            precautions: table(
                "symptom_precaution.csv",
                &["Disease", "Precaution_1", "Precaution_2"],
                &[&["Flu", "rest", "fluids"]],
            ),
        }
    }

    fn vaccination_table(rows: &[&[&str]]) -> Table {
        table("vacc.xlsx", &VACCINATION_HEADERS, rows)
    }

    #[test]
    fn flu_passage_contains_all_data_points() {
        let passages = disease_passages(&disease_tables()).unwrap();
        let flu = &passages[0];

        assert_eq!(
            flu.body,
            "Information about Flu:\n\n\
             Description: Caused by a virus\n\n\
             Common Symptoms: fever, cough\n\n\
             Recommended Precautions: rest, fluids"
        );
        assert_eq!(flu.metadata.source, DISEASE_SOURCE);
        assert_eq!(flu.metadata.entity_key, "Flu");
        assert_eq!(flu.metadata.kind, PassageKind::Disease);
    }

    #[test]
    fn symptoms_are_deduplicated_in_first_seen_order() {
        let grouped = aggregate_by_disease(&disease_tables().symptoms, "Symptom").unwrap();
        assert_eq!(grouped["Flu"], vec!["fever", "cough"]);
        assert_eq!(grouped["Malaria"], vec!["chills"]);
    }

    #[test]
    fn missing_sections_render_not_specified() {
        let passages = disease_passages(&disease_tables()).unwrap();

        let malaria = passages.iter().find(|p| p.metadata.entity_key == "Malaria").unwrap();
        assert!(malaria.body.contains("Common Symptoms: chills"));
        assert!(malaria.body.contains("Recommended Precautions: Not specified"));

        let migraine = passages.iter().find(|p| p.metadata.entity_key == "Migraine").unwrap();
        assert!(migraine.body.contains("Common Symptoms: Not specified"));
        assert!(migraine.body.contains("Recommended Precautions: Not specified"));
    }

    #[test]
    fn one_passage_per_described_disease() {
        let passages = disease_passages(&disease_tables()).unwrap();
        let names: Vec<_> = passages.iter().map(|p| p.metadata.entity_key.as_str()).collect();
        assert_eq!(names, vec!["Flu", "Malaria", "Migraine"]);
    }

    #[test]
    fn later_description_overwrites_earlier() {
        let mut tables = disease_tables();
        tables.descriptions.rows.push(row(&["Flu", "Influenza virus infection"]));

        let records = disease_records(&tables).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].description.as_deref(), Some("Influenza virus infection"));
    }

    #[test]
    fn missing_description_renders_not_specified() {
        let mut tables = disease_tables();
        tables.descriptions.rows.push(row(&["Typhoid", ""]));

        let passages = disease_passages(&tables).unwrap();
        let typhoid = passages.last().unwrap();
        assert!(typhoid.body.contains("Description: Not specified"));
    }

    #[test]
    fn missing_disease_column_is_an_error() {
        let mut tables = disease_tables();
        tables.precautions.headers[0] = "Name".into();

        let err = disease_passages(&tables).unwrap_err();
        assert!(matches!(
            err,
            IngestError::MissingColumn { ref column, .. } if column == "Disease"
        ));
    }

    #[test]
    fn odisha_rural_bcg_yields_single_passage() {
        let table = vaccination_table(&[&[
            "Odisha", "Rural", "", "", "87.5", "", "", "", "", "", "", "", "", "",
        ]]);

        let passages = vaccination_passages(&table, "data/vacc.xlsx");
        assert_eq!(passages.len(), 1);

        let p = &passages[0];
        assert!(p.body.contains("87.5"));
        assert!(p.body.contains("Received BCG"));
        assert!(p.body.contains("Odisha (Rural)"));
        assert_eq!(p.body, "In Odisha (Rural), the statistic for 'Received BCG' is 87.5%.");
        assert_eq!(p.metadata.entity_key, "Odisha (Rural)");
        assert_eq!(p.metadata.source, "data/vacc.xlsx");
        assert_eq!(p.metadata.kind, PassageKind::Vaccination);
    }

    #[test]
    fn passage_count_matches_non_missing_statistics() {
        let table = vaccination_table(&[
            &["Odisha", "Rural", "90", "80", "70", "", "", "", "", "", "", "", "", ""],
            &["", "", "", "", "", "", "", "", "", "", "", "", "", ""],
            &["Odisha", "Urban", "", "", "", "", "", "", "", "", "", "", "55", "45"],
            &["Kerala", "Total", "", "", "", "", "", "", "", "", "", "", "", ""],
        ]);

        let records = vaccination_records(&table);
        assert_eq!(records.len(), 3, "fully empty row is dropped");

        let expected: usize = records.iter().map(|r| r.attributes.len()).sum();
        assert_eq!(expected, 5);
        assert_eq!(vaccination_passages(&table, "v").len(), expected);
    }

    #[test]
    fn missing_location_renders_unknown() {
        let mut row = [""; 14];
        row[2] = "12";
        let table = vaccination_table(&[&row[..]]);
        let passages = vaccination_passages(&table, "v");
        assert_eq!(passages[0].metadata.entity_key, "Unknown (Unknown)");
    }

    #[test]
    fn truncated_headers_still_synthesize() {
        let table = table(
            "vacc.csv",
            &["States/UTs", "Area", "Children fully vaccinated (recall)"],
            &[&["Odisha", "Total", "78.1"]],
        );
        let passages = vaccination_passages(&table, "v");
        assert_eq!(passages.len(), 1);
        assert!(passages[0].body.contains("Children fully vaccinated (recall)"));
    }
}
