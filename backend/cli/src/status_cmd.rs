//! CLI Status Command
//!
//! Queries a running server and prints the call desk state.

use anyhow::Result;
use serde_json::Value;

pub async fn run(addr: &str, log_lines: usize) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("http://{}/api/calls/status?logs={}&history=5", addr, log_lines);
    let response = match client.get(&url).send().await {
        Ok(r) => r,
        Err(_) => {
            println!("Sudsline is not running on {}", addr);
            return Ok(());
        }
    };
    let status: Value = response.json().await?;
    print!("{}", render(&status));
    Ok(())
}

fn render(status: &Value) -> String {
    let mut out = String::new();
    let state = status["state"].as_str().unwrap_or("unknown");
    out.push_str(&format!("\nCall desk: {}\n", state));

    if let Some(call) = status["current_call"].as_object() {
        out.push_str(&format!(
            "  Active call with {} to {} ({}s)\n",
            call.get("assistant_name").and_then(Value::as_str).unwrap_or("?"),
            call.get("phone_number").and_then(Value::as_str).unwrap_or("n/a"),
            call.get("elapsed_secs").and_then(Value::as_i64).unwrap_or(0),
        ));
    }

    let analytics = &status["analytics"];
    out.push_str(&format!(
        "\nCalls: {} total, {} successful, {} failed, avg {:.0}s\n",
        analytics["total_calls"].as_u64().unwrap_or(0),
        analytics["successful_calls"].as_u64().unwrap_or(0),
        analytics["failed_calls"].as_u64().unwrap_or(0),
        analytics["average_duration_secs"].as_f64().unwrap_or(0.0),
    ));

    if let Some(history) = status["recent_history"].as_array().filter(|h| !h.is_empty()) {
        out.push_str("\nRecent calls:\n");
        for record in history {
            out.push_str(&format!(
                "  - {} {} {}\n",
                record["start_time"].as_str().unwrap_or(""),
                record["phone_number"].as_str().unwrap_or("-"),
                record["status"].as_str().unwrap_or(""),
            ));
        }
    }

    if let Some(logs) = status["recent_logs"].as_array().filter(|l| !l.is_empty()) {
        out.push_str("\nLog:\n");
        for entry in logs {
            out.push_str(&format!(
                "  {}: {}\n",
                entry["level"].as_str().unwrap_or("").to_uppercase(),
                entry["message"].as_str().unwrap_or(""),
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_active_call_and_counts() {
        let status = json!({
            "state": "active",
            "current_call": {"assistant_name": "Helper", "phone_number": "+1 (555) 123-4567", "elapsed_secs": 12},
            "analytics": {"total_calls": 3, "successful_calls": 2, "failed_calls": 1, "average_duration_secs": 40.0},
            "recent_history": [],
            "recent_logs": [{"level": "success", "message": "Call started"}]
        });
        let text = render(&status);
        assert!(text.contains("Call desk: active"));
        assert!(text.contains("+1 (555) 123-4567 (12s)"));
        assert!(text.contains("3 total, 2 successful, 1 failed"));
        assert!(text.contains("SUCCESS: Call started"));
        assert!(!text.contains("Recent calls"));
    }
}
