//! Courier CLI tool
//!
//! Local front end for the encryption layer: creates identities, publishes
//! them to a file-backed key directory, and encrypts/decrypts messages
//! between accounts on this machine.

use clap::{Parser, Subcommand};
use courier::{
    keys::{
        FileIdentityStore, FileKeyDirectory, IdentityStore, KeyDirectory, MemoryIdentityStore,
        MemoryKeyDirectory,
    },
    CourierConfig, Incoming, Outgoing, Session,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Courier: end-to-end encryption for direct messages
#[derive(Parser)]
#[command(name = "courier")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory (default: ~/.courier)
    #[arg(long)]
    home: Option<PathBuf>,

    /// Path to a TOML config file (default: <home>/courier.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create (or load) the identity of a user and publish its public key
    Init {
        /// User id
        user: String,
    },

    /// Display the public key a user has published
    Identity {
        /// User id
        user: String,
    },

    /// Encrypt a message from one user to another
    Encrypt {
        /// Sending user (must be initialized)
        #[arg(short, long)]
        from: String,

        /// Receiving user (looked up in the key directory)
        #[arg(short, long)]
        to: String,

        /// Message text
        message: String,
    },

    /// Decrypt a message received by one user from another
    Decrypt {
        /// Receiving user (must be initialized)
        #[arg(short, long)]
        to: String,

        /// Sending user (looked up in the key directory)
        #[arg(short, long)]
        from: String,

        /// Stored message content (envelope or legacy plaintext)
        envelope: String,
    },

    /// Run an in-memory demo of the whole flow
    Demo,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("courier=info")),
        )
        .init();

    let cli = Cli::parse();

    let home = cli.home.unwrap_or_else(default_home);
    let config = load_config(&home, cli.config.as_deref());

    match cli.command {
        Commands::Init { user } => cmd_init(&home, &config, &user).await,
        Commands::Identity { user } => cmd_identity(&home, &user).await,
        Commands::Encrypt { from, to, message } => {
            cmd_encrypt(&home, &config, &from, &to, &message).await
        }
        Commands::Decrypt { to, from, envelope } => {
            cmd_decrypt(&home, &config, &to, &from, &envelope).await
        }
        Commands::Demo => cmd_demo().await,
    }
}

fn default_home() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".courier"),
        None => fail("Could not find home directory; pass --home"),
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn load_config(home: &Path, explicit: Option<&Path>) -> CourierConfig {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = home.join("courier.toml");
            if !path.exists() {
                return CourierConfig::default();
            }
            path
        }
    };

    CourierConfig::load(&path).unwrap_or_else(|e| fail(e))
}

fn directory(home: &Path) -> Arc<FileKeyDirectory> {
    Arc::new(FileKeyDirectory::new(home.join("directory.json")))
}

fn store(home: &Path) -> Arc<FileIdentityStore> {
    Arc::new(FileIdentityStore::new(home.join("identities")))
}

async fn open_session(home: &Path, config: &CourierConfig, user: &str) -> Session {
    let session = Session::new(store(home), directory(home), config);
    session.initialize(user).await.unwrap_or_else(|e| fail(e));
    session
}

async fn fetch_key(home: &Path, user: &str) -> Option<String> {
    directory(home)
        .fetch(user)
        .await
        .unwrap_or_else(|e| fail(e))
}

async fn cmd_init(home: &Path, config: &CourierConfig, user: &str) {
    let session = open_session(home, config, user).await;
    let Some(identity) = session.lifecycle().identity() else {
        fail("identity not ready after initialization");
    };

    println!("Identity ready for {}", user);
    println!();
    println!(
        "Public key (published to {}):",
        home.join("directory.json").display()
    );
    println!("{}", identity.public_key().to_hex());
}

async fn cmd_identity(home: &Path, user: &str) {
    match fetch_key(home, user).await {
        Some(key) => println!("{}", key),
        None => {
            let local = store(home).get(user).await.unwrap_or_else(|e| fail(e));
            if local.is_some() {
                fail(format!(
                    "{} has a local key that was never published; run 'courier init {}'",
                    user, user
                ));
            }
            fail(format!("No identity for {}; run 'courier init {}'", user, user));
        }
    }
}

async fn cmd_encrypt(
    home: &Path,
    config: &CourierConfig,
    from: &str,
    to: &str,
    message: &str,
) {
    let session = open_session(home, config, from).await;
    let peer_key = fetch_key(home, to).await;

    match session.seal(message, peer_key.as_deref()).await {
        Outgoing::Encrypted(envelope) => println!("{}", envelope),
        Outgoing::Plaintext { content, reason } => {
            eprintln!("Warning: message NOT encrypted ({:?})", reason);
            println!("{}", content);
        }
    }
}

async fn cmd_decrypt(
    home: &Path,
    config: &CourierConfig,
    to: &str,
    from: &str,
    envelope: &str,
) {
    let session = open_session(home, config, to).await;
    let peer_key = fetch_key(home, from).await;

    match session.open(envelope, peer_key.as_deref()).await {
        Incoming::Decrypted(plaintext) => println!("{}", plaintext),
        Incoming::Passthrough { content, reason } => {
            eprintln!("Note: shown as stored ({:?})", reason);
            println!("{}", content);
        }
        Incoming::Undecryptable(placeholder) => {
            println!("{}", placeholder);
            std::process::exit(2);
        }
    }
}

async fn cmd_demo() {
    println!("=== Courier Demo ===");
    println!();

    let directory = Arc::new(MemoryKeyDirectory::new());
    let config = CourierConfig::default();
    let alice = Session::new(Arc::new(MemoryIdentityStore::new()), directory.clone(), &config);
    let bob = Session::new(Arc::new(MemoryIdentityStore::new()), directory.clone(), &config);

    // Step 1: Identities
    println!("--- Step 1: Identity Bootstrap ---");
    for (name, session) in [("alice", &alice), ("bob", &bob)] {
        let identity = session.initialize(name).await.unwrap_or_else(|e| fail(e));
        println!("{} published {}", name, identity.public_key().to_hex());
    }
    println!();

    let alice_pub = directory.fetch("alice").await.unwrap_or_else(|e| fail(e));
    let bob_pub = directory.fetch("bob").await.unwrap_or_else(|e| fail(e));

    // Step 2: Messages
    println!("--- Step 2: Encrypted Messaging ---");
    let e1 = bob.encrypt("hello", alice_pub.as_deref()).await;
    let e2 = bob.encrypt("hello", alice_pub.as_deref()).await;
    println!("Bob encrypts \"hello\" twice:");
    println!("  E1 = {}", e1);
    println!("  E2 = {}", e2);
    println!("Alice decrypts E1: \"{}\"", alice.decrypt(&e1, bob_pub.as_deref()).await);
    println!("Alice decrypts E2: \"{}\"", alice.decrypt(&e2, bob_pub.as_deref()).await);
    println!();

    // Step 3: Failure handling
    println!("--- Step 3: Degradation ---");
    println!(
        "Legacy plaintext \"see you at 5\" -> \"{}\"",
        alice.decrypt("see you at 5", bob_pub.as_deref()).await
    );
    println!(
        "Message to a user with no key -> {:?}",
        alice.seal("hi carol", None).await
    );

    let mut tampered = e1.into_bytes();
    if let Some(byte) = tampered.get_mut(20) {
        *byte = if *byte == b'A' { b'B' } else { b'A' };
    }
    let tampered = String::from_utf8_lossy(&tampered).into_owned();
    println!(
        "Tampered envelope -> \"{}\"",
        alice.decrypt(&tampered, bob_pub.as_deref()).await
    );

    println!();
    println!("=== Demo Complete ===");
}
