use crate::observations::RawBundle;
use crate::sink::Record;

/// Output columns, in file order.
pub const COLUMNS: [&str; 9] = [
    "sourceId",
    "referenceTime",
    "elementId",
    "value",
    "unit",
    "timeOffset",
    "level",
    "exposureCategory",
    "qualityCode",
];

/// One observation with its bundle's source and reference time copied in.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRecord {
    pub source_id: String,
    pub reference_time: String,
    pub element_id: String,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub time_offset: Option<String>,
    pub level: Option<f64>,
    pub exposure_category: Option<String>,
    pub quality_code: Option<String>,
}

pub fn flatten(bundles: &[RawBundle]) -> Vec<FlatRecord> {
    bundles
        .iter()
        .flat_map(|b| {
            b.observations.iter().map(move |o| FlatRecord {
                source_id: b.source_id.clone(),
                reference_time: b.reference_time.clone(),
                element_id: o.element_id.clone(),
                value: o.value,
                unit: o.unit.clone(),
                time_offset: o.time_offset.clone(),
                level: o.level.as_ref().and_then(|l| l.value),
                exposure_category: o.exposure_category.clone(),
                quality_code: o.quality_code.clone(),
            })
        })
        .collect()
}

impl Record for FlatRecord {
    fn keys(&self) -> Vec<String> {
        COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn values(&self) -> Vec<String> {
        fn text<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(ToString::to_string).unwrap_or_default()
        }

        vec![
            self.source_id.clone(),
            self.reference_time.clone(),
            self.element_id.clone(),
            text(&self.value),
            text(&self.unit),
            text(&self.time_offset),
            text(&self.level),
            text(&self.exposure_category),
            text(&self.quality_code),
        ]
    }
}
