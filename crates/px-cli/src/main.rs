//! Proxy Rules CLI
//!
//! CLI tool for compiling, testing and importing proxy rules.

mod bench;
mod bridge;
mod fetch;

use std::fs;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;

use px_compiler::{
    decode_payload, parse_rule_list, validate_rule, Obfuscation, ProfileRuleSubscription, RuleListFormat, RuleTester,
    ServerSubscription, Settings, SmartProfile,
};
use px_core::decision::ProxyRequest;
use px_core::types::ProxyProtocol;
use px_pac::{proxy_config_request, PacMessage, PacSnapshot};

use crate::bridge::PacBridge;
use crate::fetch::BasicAuth;

#[derive(Parser)]
#[command(name = "px-cli")]
#[command(about = "Proxy rule compiler and tools")]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum ListFormat {
    Autoproxy,
    Switchy,
}

impl From<ListFormat> for RuleListFormat {
    fn from(format: ListFormat) -> Self {
        match format {
            ListFormat::Autoproxy => RuleListFormat::AutoProxy,
            ListFormat::Switchy => RuleListFormat::SwitchyOmega,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a profile into the snapshot the PAC runtime loads
    Compile {
        /// Settings JSON file
        #[arg(short, long)]
        settings: String,

        /// Profile id (defaults to the active profile)
        #[arg(short, long)]
        profile: Option<String>,

        /// Use the incognito profile
        #[arg(long)]
        incognito: bool,

        /// Output snapshot file
        #[arg(short, long, default_value = "pac-snapshot.json")]
        output: String,
    },

    /// Validate servers and every rule in a settings file
    Validate {
        /// Settings JSON file
        #[arg(short, long)]
        settings: String,
    },

    /// Show which rule of a profile each URL hits
    Test {
        /// Settings JSON file
        #[arg(short, long)]
        settings: String,

        /// Profile id (defaults to the active profile)
        #[arg(short, long)]
        profile: Option<String>,

        /// URLs or hosts to test
        #[arg(required = true)]
        urls: Vec<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import a GFWList/AutoProxy or SwitchyOmega list, or a server list
    Import {
        /// File path or http(s) URL
        #[arg(short, long)]
        input: String,

        /// Force a list format instead of detecting it
        #[arg(short, long, value_enum)]
        format: Option<ListFormat>,

        /// Payload is base64 encoded
        #[arg(long)]
        base64: bool,

        /// Treat the payload as a proxy server list
        #[arg(long)]
        servers: bool,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        password: Option<String>,

        /// Output JSON file (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Print the routing decision for each URL
    Decide {
        /// Settings JSON file
        #[arg(short, long)]
        settings: String,

        #[arg(long)]
        incognito: bool,

        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Route URLs through the message-driven PAC runtime
    Pac {
        /// Settings JSON file
        #[arg(short, long)]
        settings: String,

        /// PAC script source reported in the proxy settings request
        #[arg(long, default_value = "pac.js")]
        pac_source: String,

        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Benchmark routing decisions for a profile
    Bench {
        /// Settings JSON file
        #[arg(short, long)]
        settings: String,

        /// Profile id (defaults to the active profile)
        #[arg(short, long)]
        profile: Option<String>,

        #[arg(long, default_value_t = 1000)]
        iterations: usize,

        /// Number of generated URLs
        #[arg(long, default_value_t = 1000)]
        requests: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    env_logger::init_from_env(Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }));

    let result = match cli.command {
        Commands::Compile {
            settings,
            profile,
            incognito,
            output,
        } => cmd_compile(&settings, profile.as_deref(), incognito, &output),
        Commands::Validate { settings } => cmd_validate(&settings),
        Commands::Test {
            settings,
            profile,
            urls,
            json,
        } => cmd_test(&settings, profile.as_deref(), &urls, json),
        Commands::Import {
            input,
            format,
            base64,
            servers,
            username,
            password,
            output,
        } => {
            let auth = BasicAuth { username, password };
            let obfuscation = if base64 { Obfuscation::Base64 } else { Obfuscation::None };
            cmd_import(&input, format, obfuscation, servers, &auth, output.as_deref()).await
        }
        Commands::Decide {
            settings,
            incognito,
            urls,
        } => cmd_decide(&settings, incognito, &urls),
        Commands::Pac {
            settings,
            pac_source,
            urls,
        } => cmd_pac(&settings, &pac_source, &urls).await,
        Commands::Bench {
            settings,
            profile,
            iterations,
            requests,
        } => bench::run(bench::BenchOptions {
            settings_path: settings,
            profile,
            iterations,
            requests,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_settings(path: &str) -> Result<Settings, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    Settings::from_json(&text).map_err(|e| format!("Invalid settings '{}': {}", path, e))
}

fn select_profile<'a>(settings: &'a Settings, profile: Option<&str>, incognito: bool) -> Result<&'a SmartProfile, String> {
    match profile {
        Some(id) => settings.profile(id).ok_or_else(|| format!("Profile '{id}' not found")),
        None => settings.active_profile(incognito).map_err(|e| e.to_string()),
    }
}

fn cmd_compile(settings_path: &str, profile: Option<&str>, incognito: bool, output: &str) -> Result<(), String> {
    let start = Instant::now();
    let settings = load_settings(settings_path)?;
    let profile = select_profile(&settings, profile, incognito)?;

    let compiled = settings.compile(profile);
    for error in &compiled.errors {
        eprintln!("  Warning: {error}");
    }

    let snapshot = PacSnapshot::from_state(&compiled.state, &settings.bypass);
    let json = serde_json::to_string_pretty(&snapshot).map_err(|e| format!("Failed to encode snapshot: {}", e))?;
    fs::write(output, &json).map_err(|e| format!("Failed to write '{}': {}", output, e))?;

    println!("Compiled profile '{}' ({:?})", profile.profile_id, profile.profile_type);
    println!("  Rules: {}", compiled.state.compiled_rules.len());
    println!("  Errors: {}", compiled.errors.len());
    match &compiled.state.active_proxy_server {
        Some(server) => println!("  Proxy: {} ({})", server.name, server.pac_result()),
        None => println!("  Proxy: none"),
    }
    println!("  Output: {} ({} bytes)", output, json.len());
    println!("  Time: {:.2}ms", start.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}

fn cmd_validate(settings_path: &str) -> Result<(), String> {
    let settings = load_settings(settings_path)?;

    let mut problems = 0usize;
    if let Err(e) = settings.validate_servers() {
        eprintln!("  {e}");
        problems += 1;
    }

    let mut checked = 0usize;
    for profile in &settings.proxy_profiles {
        for rule in &profile.proxy_rules {
            checked += 1;
            if let Err(e) = validate_rule(rule) {
                eprintln!("  [{}] rule '{}' ({}): {}", profile.profile_id, rule.rule_id, rule.host_name, e);
                problems += 1;
            }
        }
    }

    println!("Servers: {}", settings.all_proxy_servers().len());
    println!("Profiles: {}", settings.proxy_profiles.len());
    println!("Rules checked: {checked}");

    if problems > 0 {
        return Err(format!("{problems} problem(s) found"));
    }
    println!("Settings are valid");
    Ok(())
}

fn cmd_test(settings_path: &str, profile: Option<&str>, urls: &[String], json: bool) -> Result<(), String> {
    let settings = load_settings(settings_path)?;
    let profile = select_profile(&settings, profile, false)?;
    let servers = settings.all_proxy_servers();

    let tester = RuleTester::new(&profile.proxy_rules, &servers);
    let results = tester.test_many(urls.iter().map(String::as_str));

    if json {
        let out = serde_json::to_string_pretty(&results).map_err(|e| e.to_string())?;
        println!("{out}");
        return Ok(());
    }

    for result in &results {
        match &result.matched {
            Some(m) => println!(
                "{} -> #{} '{}' ({}){}",
                result.url,
                m.index,
                m.host_name,
                m.rule_id,
                if m.white_list { " [whitelist]" } else { "" }
            ),
            None => println!("{} -> no match", result.url),
        }
    }
    log::debug!("compiled {} of {} rules", tester.compiled_count(), profile.proxy_rules.len());
    Ok(())
}

async fn cmd_import(
    input: &str,
    format: Option<ListFormat>,
    obfuscation: Obfuscation,
    servers: bool,
    auth: &BasicAuth,
    output: Option<&str>,
) -> Result<(), String> {
    let raw = fetch::read_source(input, auth).await?;

    let json = if servers {
        let mut subscription = ServerSubscription {
            name: input.to_string(),
            url: input.to_string(),
            enabled: true,
            obfuscation,
            proxy_protocol: ProxyProtocol::Http,
            username: auth.username.clone(),
            password: auth.password.clone(),
            ..Default::default()
        };
        let count = subscription.apply_payload(&raw).map_err(|e| e.to_string())?;
        eprintln!("Imported {count} servers");
        serde_json::to_string_pretty(&subscription).map_err(|e| e.to_string())?
    } else {
        let mut subscription = ProfileRuleSubscription {
            name: input.to_string(),
            url: input.to_string(),
            enabled: true,
            obfuscation,
            username: auth.username.clone(),
            password: auth.password.clone(),
            ..Default::default()
        };
        match format {
            Some(format) => {
                let text = decode_payload(&raw, obfuscation).map_err(|e| e.to_string())?;
                let list = parse_rule_list(format.into(), &text);
                subscription.format = format.into();
                subscription.proxy_rules = list.black_list;
                subscription.whitelist_rules = list.white_list;
            }
            None => {
                subscription.apply_payload(&raw).map_err(|e| e.to_string())?;
            }
        }
        eprintln!(
            "Imported {} proxy and {} whitelist rules ({:?})",
            subscription.proxy_rules.len(),
            subscription.whitelist_rules.len(),
            subscription.format
        );
        serde_json::to_string_pretty(&subscription).map_err(|e| e.to_string())?
    };

    match output {
        Some(path) => fs::write(path, json).map_err(|e| format!("Failed to write '{}': {}", path, e)),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

fn cmd_decide(settings_path: &str, incognito: bool, urls: &[String]) -> Result<(), String> {
    let settings = load_settings(settings_path)?;
    let compiled = settings.compile_active(incognito).map_err(|e| e.to_string())?;

    for url in urls {
        let decision = px_core::decide(&ProxyRequest::new(url), &compiled.state, &settings.bypass);
        let json = serde_json::to_string(&decision).map_err(|e| e.to_string())?;
        println!("{url}\t{json}");
    }
    Ok(())
}

async fn cmd_pac(settings_path: &str, pac_source: &str, urls: &[String]) -> Result<(), String> {
    let settings = load_settings(settings_path)?;
    let compiled = settings.compile_active(false).map_err(|e| e.to_string())?;

    let request = proxy_config_request(compiled.state.profile_type, pac_source);
    println!("{}", serde_json::to_string_pretty(&request).map_err(|e| e.to_string())?);

    let (bridge, handle) = PacBridge::spawn(bridge::DEFAULT_CAPACITY);
    bridge
        .push(PacMessage::Init(PacSnapshot::from_state(&compiled.state, &settings.bypass)))
        .await?;

    for url in urls {
        let host = px_core::url::extract_host(url).unwrap_or(url.as_str()).to_string();
        let result = bridge.find_proxy(url, &host).await?;
        println!("{url}\t{result}");
    }

    drop(bridge);
    handle.await.map_err(|e| format!("PAC actor failed: {}", e))
}
