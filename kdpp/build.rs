use vergen::{vergen, Config};

fn main() {
    // Outside of a git checkout there is no commit to embed
    if let Err(e) = vergen(Config::default()) {
        println!("cargo:warning=build information unavailable: {}", e);
    }
}
