//! VCF header metadata and variant records.

use crate::classify::info_end;
use crate::record::RawFields;
use crate::{Error, Result};
use noodles::vcf;
use noodles::vcf::header::record::value::Map;
use noodles::vcf::header::record::value::map::Info;
use noodles::vcf::header::record::value::map::info::{Number, Type};
use tracing::debug;

const MISSING: &str = ".";

/// Parsed VCF header of an indexed file.
#[derive(Debug, Clone)]
pub struct VariantHeader {
    header: vcf::Header,
}

impl VariantHeader {
    pub fn parse(text: &str) -> Result<Self> {
        let header = text
            .parse::<vcf::Header>()
            .map_err(|e| Error::InvalidHeader(e.to_string()))?;

        debug!(
            infos = header.infos().len(),
            samples = header.sample_names().len(),
            "parsed VCF header"
        );

        Ok(Self { header })
    }

    pub fn sample_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.header.sample_names().iter().map(String::as_str)
    }

    /// Declare an INFO field, replacing any existing definition.
    pub fn add_info(&mut self, id: &str, number: &str, ty: &str, description: &str) -> Result<()> {
        let number = parse_number(number)
            .ok_or_else(|| Error::InvalidMetadata(format!("{} number {:?}", id, number)))?;
        let ty: Type = ty
            .parse()
            .map_err(|e| Error::InvalidMetadata(format!("{} type {:?}: {}", id, ty, e)))?;

        self.header
            .infos_mut()
            .insert(id.to_string(), Map::<Info>::new(number, ty, description));
        Ok(())
    }

    /// Declared type of INFO field `id`, e.g. `Integer`.
    pub fn field_type(&self, id: &str) -> Option<String> {
        self.header.infos().get(id).map(|info| info.ty().to_string())
    }

    pub fn field_description(&self, id: &str) -> Option<String> {
        self.header
            .infos()
            .get(id)
            .map(|info| info.description().to_string())
    }

    pub fn field_number(&self, id: &str) -> Option<String> {
        self.header
            .infos()
            .get(id)
            .map(|info| format_number(info.number()))
    }

    /// Interpret the nine-token view of a data line.
    ///
    /// `start` and `end` are the 0-based extent already derived from the
    /// position and alleles.
    pub fn parse_record(&self, fields: RawFields, start: u64, end: u64) -> Result<Variant> {
        let column = |i: usize, name: &str| -> Result<String> {
            fields
                .get_str(i)
                .ok_or_else(|| Error::missing_column(name, i))
        };

        let chrom = column(0, "CHROM")?;
        let id = column(2, "ID")?;
        let reference = column(3, "REF")?;
        let alternates = split_list(&column(4, "ALT")?, ',');

        let quality = match column(5, "QUAL")?.as_str() {
            MISSING => None,
            value => Some(value.parse::<f32>().map_err(|e| {
                Error::record("QUAL", value.as_bytes(), e)
            })?),
        };

        let filters = split_list(&column(6, "FILTER")?, ';');
        let info = fields.get_str(7).unwrap_or_else(|| MISSING.to_string());

        let (format, samples) = match fields.get_str(8) {
            Some(rest) => {
                let mut columns = rest.split('\t').map(str::to_string);
                let format = columns.next().unwrap_or_default();
                (split_list(&format, ':'), columns.collect::<Vec<_>>())
            }
            None => (Vec::new(), Vec::new()),
        };

        let expected = self.header.sample_names().len();
        if !format.is_empty() && samples.len() != expected {
            return Err(Error::InvalidRecord(format!(
                "{}:{} has {} sample columns, header declares {}",
                chrom,
                start + 1,
                samples.len(),
                expected
            )));
        }

        Ok(Variant {
            chrom,
            position: start + 1,
            ids: split_list(&id, ';'),
            reference,
            alternates,
            quality,
            filters,
            info,
            format,
            samples,
            start,
            end,
            fields,
        })
    }
}

/// A VCF data line.
#[derive(Debug, Clone)]
pub struct Variant {
    pub chrom: String,
    /// 1-based POS.
    pub position: u64,
    pub ids: Vec<String>,
    pub reference: String,
    pub alternates: Vec<String>,
    pub quality: Option<f32>,
    pub filters: Vec<String>,
    /// Raw INFO column.
    pub info: String,
    pub format: Vec<String>,
    /// One raw column per sample, in header order.
    pub samples: Vec<String>,
    /// 0-based start.
    pub start: u64,
    /// Exclusive end: `END=` for structural alleles, else the REF span.
    pub end: u64,
    pub fields: RawFields,
}

impl Variant {
    /// Value of INFO key `key`; `Some("")` for a flag.
    pub fn info(&self, key: &str) -> Option<&str> {
        if self.info == MISSING {
            return None;
        }

        self.info.split(';').find_map(|entry| match entry.split_once('=') {
            Some((k, value)) if k == key => Some(value),
            None if entry == key => Some(""),
            _ => None,
        })
    }

    /// Declared `END=`, if any.
    pub fn info_end(&self) -> Option<u64> {
        info_end(self.info.as_bytes())
            .and_then(|value| std::str::from_utf8(value).ok())
            .and_then(|value| value.parse().ok())
    }

    /// Sample column `i` keyed by the FORMAT keys.
    pub fn sample(&self, i: usize) -> Option<Vec<(&str, &str)>> {
        let column = self.samples.get(i)?;
        Some(
            self.format
                .iter()
                .map(String::as_str)
                .zip(column.split(':'))
                .collect(),
        )
    }
}

/// `Number=` value of a header line: a count, `A`, `R`, `G` or `.`.
fn parse_number(value: &str) -> Option<Number> {
    match value {
        "A" => Some(Number::AlternateBases),
        "R" => Some(Number::ReferenceAlternateBases),
        "G" => Some(Number::Samples),
        MISSING => Some(Number::Unknown),
        digits if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.parse().ok().map(Number::Count)
        }
        _ => None,
    }
}

fn format_number(number: Number) -> String {
    match number {
        Number::Count(n) => n.to_string(),
        Number::AlternateBases => "A".to_string(),
        Number::ReferenceAlternateBases => "R".to_string(),
        Number::Samples => "G".to_string(),
        Number::Unknown => MISSING.to_string(),
    }
}

fn split_list(value: &str, separator: char) -> Vec<String> {
    if value == MISSING {
        return Vec::new();
    }
    value.split(separator).map(str::to_string).collect()
}
