//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};

use crate::cli::args::{AdsieveArgs, OutputFormat};
use crate::error::Result;
use crate::pipeline::TrainingReport;
use crate::predict::Prediction;

/// Result structure for a training run.
#[derive(Debug, Serialize)]
pub struct TrainingSummary {
    pub reports: Vec<TrainingReport>,
    pub failures: Vec<TaskFailure>,
}

/// A task whose pipeline failed.
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task: String,
    pub error: String,
}

/// Result structure for normalization.
#[derive(Debug, Serialize, Deserialize)]
pub struct NormalizedText {
    pub input: String,
    pub normalized: String,
}

/// Result structure for prediction.
#[derive(Debug, Serialize)]
pub struct PredictionResults {
    pub task: String,
    pub threshold: Option<f32>,
    pub predictions: Vec<TextPrediction>,
}

/// One classified text.
#[derive(Debug, Serialize)]
pub struct TextPrediction {
    pub text: String,
    #[serde(flatten)]
    pub prediction: Prediction,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &AdsieveArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: Serialize>(message: &str, result: &T, args: &AdsieveArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;

    match result {
        _ if std::any::type_name::<T>().ends_with("TrainingSummary") => {
            output_training_summary_human(&value)
        }
        _ if std::any::type_name::<T>().ends_with("PredictionResults") => {
            output_predictions_human(&value)
        }
        _ => output_generic_human(&value),
    }
}

/// Output training reports in human format.
fn output_training_summary_human(value: &serde_json::Value) -> Result<()> {
    if let Some(reports) = value.get("reports").and_then(|r| r.as_array()) {
        for report in reports {
            let task = report.get("task").map(format_value).unwrap_or_default();
            println!("Task: {task}");
            println!("══════════");
            for key in [
                "samples",
                "train_samples",
                "test_samples",
                "labels",
                "vocabulary_size",
                "test_accuracy",
                "quantized_accuracy",
                "model_bytes",
                "duration_secs",
                "output_dir",
            ] {
                if let Some(val) = report.get(key) {
                    println!("  {key}: {}", format_value(val));
                }
            }
            println!();
        }
    }

    if let Some(failures) = value.get("failures").and_then(|f| f.as_array())
        && !failures.is_empty()
    {
        println!("Failed tasks:");
        for failure in failures {
            let task = failure.get("task").map(format_value).unwrap_or_default();
            let error = failure.get("error").map(format_value).unwrap_or_default();
            println!("  {task}: {error}");
        }
    }
    Ok(())
}

/// Output predictions in human format.
fn output_predictions_human(value: &serde_json::Value) -> Result<()> {
    let Some(predictions) = value.get("predictions").and_then(|p| p.as_array()) else {
        return output_generic_human(value);
    };

    for (i, prediction) in predictions.iter().enumerate() {
        let field = |key: &str| prediction.get(key).map(format_value).unwrap_or_default();
        println!("{}. {}", i + 1, field("text"));
        print!("   label: {} (confidence {})", field("label"), field("confidence"));
        if let Some(flag) = prediction.get("is_ad") {
            print!(", is_ad: {}", format_value(flag));
        }
        println!();
        println!(
            "   coverage: {} ({} n-grams matched)",
            field("coverage"),
            field("matched_ngrams")
        );
    }
    Ok(())
}

/// Output arbitrary values in human format.
fn output_generic_human(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(obj) => {
            for (key, val) in obj {
                let formatted_val = format_value(val);
                println!("{key}: {formatted_val}");
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                output_generic_human(item)?;
                if item.is_object() {
                    println!();
                }
            }
        }
        _ => {
            let formatted_value = format_value(value);
            println!("{formatted_value}");
        }
    }
    Ok(())
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &AdsieveArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

/// Format a JSON value for human output.
fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{f:.4}"),
            _ => n.to_string(),
        },
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(arr) => {
            let formatted_values = arr.iter().map(format_value).collect::<Vec<_>>().join(", ");
            format!("[{formatted_values}]")
        }
        serde_json::Value::Object(_) => "[object]".to_string(),
        serde_json::Value::Null => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&json!(0.912345)), "0.9123");
        assert_eq!(format_value(&json!(42)), "42");
        assert_eq!(format_value(&json!(["ad", "normal"])), "[ad, normal]");
        assert_eq!(format_value(&json!(null)), "-");
    }
}
