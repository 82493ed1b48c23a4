//! Job commands.

use anyhow::{Context, Result, anyhow, bail};
use jobcast_core::{JobId, Priority};
use serde_json::{Value, json};
use url::Url;

/// Build `{api_url}/api/v1/jobs[/segments...]`.
fn jobs_url(api_url: &str, segments: &[&str]) -> Result<Url> {
    let mut url =
        Url::parse(api_url).with_context(|| format!("Invalid API URL: {}", api_url))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("API URL cannot carry a path: {}", api_url))?
        .pop_if_empty()
        .extend(["api", "v1", "jobs"])
        .extend(segments);
    Ok(url)
}

fn submission_body(
    job_type: &str,
    payload: &str,
    priority: &str,
    run_at: Option<String>,
) -> Result<Value> {
    if job_type.trim().is_empty() {
        bail!("Job type must not be empty");
    }
    let priority: Priority = priority.parse()?;
    let payload: Value =
        serde_json::from_str(payload).context("Payload must be valid JSON")?;

    let mut body = json!({
        "type": job_type,
        "payload": payload,
        "priority": priority.as_str(),
    });
    if let Some(run_at) = run_at {
        body["run_at"] = Value::String(run_at);
    }
    Ok(body)
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .context("Invalid response from API server")?;
    if !status.is_success() {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        bail!("API error ({}): {}", status, message);
    }
    Ok(body)
}

pub async fn submit(
    api_url: &str,
    job_type: &str,
    payload: &str,
    priority: &str,
    run_at: Option<String>,
) -> Result<()> {
    let body = submission_body(job_type, payload, priority, run_at)?;
    let url = jobs_url(api_url, &[])?;

    let response = reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .context("Failed to reach API server")?;
    let job = read_json(response).await?;

    println!("Submitted job {}", job["id"].as_str().unwrap_or("?"));
    println!("  priority: {}", job["priority"].as_str().unwrap_or("?"));
    println!("  run at:   {}", job["run_at"].as_str().unwrap_or("?"));
    Ok(())
}

pub async fn status(api_url: &str, id: &str) -> Result<()> {
    let id: JobId = id.parse()?;
    let url = jobs_url(api_url, &[&id.to_string(), "status"])?;

    let response = reqwest::get(url)
        .await
        .context("Failed to reach API server")?;
    let view = read_json(response).await?;

    println!("Job {}", id);
    println!("  type:     {}", view["type"].as_str().unwrap_or("?"));
    println!("  status:   {}", view["status"].as_str().unwrap_or("?"));
    println!("  priority: {}", view["priority"].as_str().unwrap_or("?"));
    println!("  attempts: {}", view["attempts"]);
    println!("  run at:   {}", view["run_at"].as_str().unwrap_or("?"));
    Ok(())
}

pub async fn show(api_url: &str, id: &str) -> Result<()> {
    let id: JobId = id.parse()?;
    let url = jobs_url(api_url, &[&id.to_string()])?;

    let response = reqwest::get(url)
        .await
        .context("Failed to reach API server")?;
    let job = read_json(response).await?;

    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}
