//! Password hashing utility
//!
//! Generates an Argon2id hash for provisioning helpdesk accounts by hand.
//!
//! Usage:
//!   cargo run --bin hash-password
//!   cargo run --bin hash-password "MySecurePassword123!"
//!
//! Reading from stdin keeps the password out of the process list.

use std::env;
use std::io::{self, Write};

use helpdesk_api::auth::{hash_password, validate_password};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let password = if let Some(pwd) = env::args().nth(1) {
        pwd
    } else {
        print!("Enter password to hash: ");
        io::stdout().flush()?;

        let mut password = String::new();
        io::stdin().read_line(&mut password)?;
        password.trim_end_matches(['\r', '\n']).to_string()
    };

    if let Err(e) = validate_password(&password) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let password_hash = hash_password(&password)?;

    println!("\n===========================================");
    println!("Password Hash (Argon2id):");
    println!("===========================================");
    println!("{password_hash}");
    println!("===========================================\n");

    println!("Store it in the 'password_hash' column of the 'users' table:");
    println!("UPDATE users SET password_hash = '{password_hash}' WHERE email = 'admin@example.com';");

    Ok(())
}
