use crate::errors::{Result, ScreenerError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

// Provider timestamps: "2024-05-01" for daily bars, "2024-05-01 15:30:00" intraday
pub fn parse_provider_datetime(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt);
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")?;
    Ok(date.and_time(NaiveTime::MIN))
}

pub fn format_bar_date(datetime: &NaiveDateTime) -> String {
    if datetime.time() == NaiveTime::MIN {
        datetime.format("%Y-%m-%d").to_string()
    } else {
        datetime.format("%Y-%m-%d %H:%M").to_string()
    }
}

pub fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| ScreenerError::DataError(format!("Invalid timestamp: {}", millis)))
}

// Arrow conversion for the result store
pub mod arrow_utils {
    use super::*;
    use crate::models::screening::{ScreeningRecord, ScreeningSession, QualifiedCandidate};
    use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder, UInt64Builder};
    use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
    use arrow::ipc::reader::FileReader;
    use arrow::ipc::writer::FileWriter;
    use arrow::record_batch::RecordBatch;
    use arrow_array::{Array, BooleanArray, Float64Array, Int64Array, StringArray, UInt64Array};
    use log::info;
    use std::fs::File;
    use std::path::Path;
    use std::sync::Arc;

    pub fn results_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("screened_at", DataType::Int64, false),
            Field::new("symbol", DataType::Utf8, false),
            Field::new("company_name", DataType::Utf8, false),
            Field::new("score", DataType::Float64, false),
            Field::new("meets_all_criteria", DataType::Boolean, false),
            Field::new("technical", DataType::Utf8, false),
            Field::new("fundamental", DataType::Utf8, false),
            Field::new("chart_data", DataType::Utf8, true),
        ]))
    }

    pub fn sessions_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("timestamp", DataType::Int64, false),
            Field::new("symbol_count", DataType::UInt64, false),
            Field::new("qualified_count", DataType::UInt64, false),
            Field::new("execution_time", DataType::Float64, false),
        ]))
    }

    pub fn results_to_record_batch(records: &[ScreeningRecord]) -> Result<RecordBatch> {
        let mut screened_at = Int64Builder::new();
        let mut symbol = StringBuilder::new();
        let mut company_name = StringBuilder::new();
        let mut score = Float64Builder::new();
        let mut meets_all = BooleanBuilder::new();
        let mut technical = StringBuilder::new();
        let mut fundamental = StringBuilder::new();
        let mut chart_data = StringBuilder::new();

        for record in records {
            let candidate = &record.candidate;
            screened_at.append_value(record.screened_at.timestamp_millis());
            symbol.append_value(&candidate.symbol);
            company_name.append_value(&candidate.company_name);
            score.append_value(candidate.score);
            meets_all.append_value(candidate.meets_all_criteria);
            technical.append_value(serde_json::to_string(&candidate.technical)?);
            fundamental.append_value(serde_json::to_string(&candidate.fundamental)?);
            match &candidate.chart_data {
                Some(chart) => chart_data.append_value(serde_json::to_string(chart)?),
                None => chart_data.append_null(),
            }
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(screened_at.finish()),
            Arc::new(symbol.finish()),
            Arc::new(company_name.finish()),
            Arc::new(score.finish()),
            Arc::new(meets_all.finish()),
            Arc::new(technical.finish()),
            Arc::new(fundamental.finish()),
            Arc::new(chart_data.finish()),
        ];

        Ok(RecordBatch::try_new(results_schema(), columns)?)
    }

    pub fn sessions_to_record_batch(sessions: &[ScreeningSession]) -> Result<RecordBatch> {
        let mut timestamp = Int64Builder::new();
        let mut symbol_count = UInt64Builder::new();
        let mut qualified_count = UInt64Builder::new();
        let mut execution_time = Float64Builder::new();

        for session in sessions {
            timestamp.append_value(session.timestamp.timestamp_millis());
            symbol_count.append_value(session.symbol_count as u64);
            qualified_count.append_value(session.qualified_count as u64);
            execution_time.append_value(session.execution_time);
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(timestamp.finish()),
            Arc::new(symbol_count.finish()),
            Arc::new(qualified_count.finish()),
            Arc::new(execution_time.finish()),
        ];

        Ok(RecordBatch::try_new(sessions_schema(), columns)?)
    }

    fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<T>())
            .ok_or_else(|| ScreenerError::ArrowError(format!("Failed to downcast {} column", name)))
    }

    fn read_batches(path: &Path) -> Result<Vec<RecordBatch>> {
        let file = File::open(path)?;
        let reader = FileReader::try_new(file, None)?;
        let mut batches = Vec::new();
        for batch in reader {
            batches.push(batch?);
        }
        Ok(batches)
    }

    pub fn read_results(path: &Path) -> Result<Vec<ScreeningRecord>> {
        let mut records = Vec::new();

        for batch in read_batches(path)? {
            let screened_at = column::<Int64Array>(&batch, "screened_at")?;
            let symbol = column::<StringArray>(&batch, "symbol")?;
            let company_name = column::<StringArray>(&batch, "company_name")?;
            let score = column::<Float64Array>(&batch, "score")?;
            let meets_all = column::<BooleanArray>(&batch, "meets_all_criteria")?;
            let technical = column::<StringArray>(&batch, "technical")?;
            let fundamental = column::<StringArray>(&batch, "fundamental")?;
            let chart_data = column::<StringArray>(&batch, "chart_data")?;

            for i in 0..batch.num_rows() {
                let chart = if chart_data.is_null(i) {
                    None
                } else {
                    Some(serde_json::from_str(chart_data.value(i))?)
                };

                records.push(ScreeningRecord {
                    screened_at: millis_to_datetime(screened_at.value(i))?,
                    candidate: QualifiedCandidate {
                        symbol: symbol.value(i).to_string(),
                        company_name: company_name.value(i).to_string(),
                        score: score.value(i),
                        technical: serde_json::from_str(technical.value(i))?,
                        fundamental: serde_json::from_str(fundamental.value(i))?,
                        chart_data: chart,
                        meets_all_criteria: meets_all.value(i),
                    },
                });
            }
        }

        Ok(records)
    }

    pub fn read_sessions(path: &Path) -> Result<Vec<ScreeningSession>> {
        let mut sessions = Vec::new();

        for batch in read_batches(path)? {
            let timestamp = column::<Int64Array>(&batch, "timestamp")?;
            let symbol_count = column::<UInt64Array>(&batch, "symbol_count")?;
            let qualified_count = column::<UInt64Array>(&batch, "qualified_count")?;
            let execution_time = column::<Float64Array>(&batch, "execution_time")?;

            for i in 0..batch.num_rows() {
                sessions.push(ScreeningSession {
                    timestamp: millis_to_datetime(timestamp.value(i))?,
                    symbol_count: symbol_count.value(i) as usize,
                    qualified_count: qualified_count.value(i) as usize,
                    execution_time: execution_time.value(i),
                });
            }
        }

        Ok(sessions)
    }

    pub fn write_batch(batch: &RecordBatch, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = FileWriter::try_new(file, &batch.schema())?;
        writer.write(batch)?;
        writer.finish()?;
        Ok(())
    }

    pub fn save_results(records: &[ScreeningRecord], path: &Path) -> Result<()> {
        info!("Saving {} screening results to {}", records.len(), path.display());
        write_batch(&results_to_record_batch(records)?, path)
    }

    pub fn save_sessions(sessions: &[ScreeningSession], path: &Path) -> Result<()> {
        info!("Saving {} screening sessions to {}", sessions.len(), path.display());
        write_batch(&sessions_to_record_batch(sessions)?, path)
    }

    /// Zero-row file carrying just the schema.
    pub fn write_empty(schema: SchemaRef, path: &Path) -> Result<()> {
        write_batch(&RecordBatch::new_empty(schema), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_daily_and_intraday() {
        let daily = parse_provider_datetime("2024-05-01").unwrap();
        assert_eq!(format_bar_date(&daily), "2024-05-01");

        let intraday = parse_provider_datetime(" 2024-05-01 15:30:00 ").unwrap();
        assert_eq!(format_bar_date(&intraday), "2024-05-01 15:30");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_provider_datetime("05/01/2024").is_err());
        assert!(parse_provider_datetime("").is_err());
    }

    #[test]
    fn test_millis_round_trip() {
        let dt = millis_to_datetime(1_714_579_200_000).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_714_579_200_000);
    }
}
