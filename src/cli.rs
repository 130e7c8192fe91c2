use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "rust-openid-client")]
#[command(version)]
#[command(about = "Drives browser-style OpenID logins and replays cached sessions.", long_about = None)]
pub struct Args {
    /// Base URL of the relying service.
    #[arg(short, long)]
    pub base_url: String,

    /// Base URL of the identity provider.
    #[arg(long)]
    pub provider_url: String,

    /// Login endpoint override (defaults to {base-url}/login).
    #[arg(long)]
    pub login_url: Option<String>,

    /// Endpoint to call, relative to the base URL.
    #[arg(short, long)]
    pub path: Option<String>,

    /// HTTP verb for the call (GET/POST).
    #[arg(short, long, default_value = "POST")]
    pub verb: String,

    /// JSON object of parameters to send (e.g., '{"status":"active"}').
    #[arg(long)]
    pub params: Option<String>,

    /// Username to authenticate as.
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password; prompted for interactively when omitted.
    #[arg(long)]
    pub password: Option<String>,

    /// Call the endpoint without attaching session cookies.
    #[arg(long)]
    pub anonymous: bool,

    /// Skip TLS certificate verification (testing only).
    #[arg(long)]
    pub insecure: bool,

    /// Transport retries for transient failures (-1 retries forever).
    #[arg(long, default_value_t = 0)]
    pub retries: i32,

    /// Connection timeout in seconds (connect only, not download).
    #[arg(long, default_value_t = 120)]
    pub timeout: u64,

    /// Disable the on-disk session cache for this run.
    #[arg(long)]
    pub no_cache: bool,

    /// Session cache file override.
    #[arg(long)]
    pub cache_path: Option<String>,

    /// List cached sessions and exit.
    #[arg(long)]
    pub sessions: bool,

    /// Delete the cached sessions for the user and exit.
    #[arg(long)]
    pub logout: bool,
}
