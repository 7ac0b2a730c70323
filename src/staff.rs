use crate::error::ChatError;
use reqwest::Client as HttpClient;

/// `GET {base}/api/online-staff`, a JSON array of usernames.
pub async fn fetch_online_staff(http: &HttpClient, base_url: &str) -> Result<Vec<String>, ChatError> {
    let url = format!("{}/api/online-staff", base_url.trim_end_matches('/'));
    let resp = http.get(&url).send().await?.error_for_status()?;
    let mut staff = resp.json::<Vec<String>>().await?;
    staff.sort();
    Ok(staff)
}
