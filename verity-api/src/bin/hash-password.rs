//! Password Hash Generator Binary
//!
//! Prints an argon2 PHC hash for seeding `admin_users.password_hash`.
//!
//! Usage:
//!   cargo run -p verity-api --bin hash-password -- 'correct horse'
//!   echo 'correct horse' | cargo run -p verity-api --bin hash-password

use std::io::BufRead;

use verity_api::hash_password;

fn read_password() -> Option<String> {
    if let Some(arg) = std::env::args().nth(1) {
        return Some(arg);
    }
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line).ok()?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    (!password.is_empty()).then_some(password)
}

fn main() {
    let Some(password) = read_password() else {
        eprintln!("Usage: hash-password <password>  (or pass it on stdin)");
        std::process::exit(2);
    };

    match hash_password(&password) {
        Ok(hash) => println!("{}", hash),
        Err(e) => {
            eprintln!("Failed to hash password: {}", e.message);
            std::process::exit(1);
        }
    }
}
