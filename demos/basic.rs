use std::time::Duration;

use resilient_http::{
    header, Client, ClientOptions, ExponentialBackoff, HeaderMap, Jittered, TracingInterceptor,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = std::env::var("DEMO_URL").unwrap_or_else(|_| "https://httpbin.org/anything".to_owned());
    let options = ClientOptions::from_env()?;

    let client = Client::builder()
        .options(options)
        .retrier(Jittered::equal(
            ExponentialBackoff::new(Duration::from_millis(200)).with_max(Duration::from_secs(5)),
        ))
        .interceptor(TracingInterceptor)
        .build()?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, "application/json".parse()?);

    let created = client
        .post(&url, r#"{"name":"Kit"}"#, headers.clone())
        .await?;
    println!("POST {} -> {}", url, created.status());

    let fetched = client.get(&url, HeaderMap::new()).await?;
    if fetched.is_server_error() {
        println!("server still failing after retries: {}", fetched.status());
    } else {
        println!("GET {} -> {}\n{}", url, fetched.status(), fetched.text());
    }

    Ok(())
}
