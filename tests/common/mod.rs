//! Synthetic change tables shared by the integration tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

pub const COMMODITIES: [&str; 7] = ["211", "212", "324", "325", "326", "327", "Other"];

/// Writes ratio-valued input and output change tables for years 1970..=2009.
///
/// Industry 211 follows `adj(324) = adj(325) - adj(326) + noise`, where `adj` is the
/// output-adjusted change. Commodity 327 drops out of 211's inputs in 1980. Industry
/// 212 stops using the focus commodity 324 in 1975.
pub fn write_change_tables(input_path: &Path, output_path: &Path, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.01).unwrap();
    let mut inputs = String::from("year,industry,commodity,value\n");
    let mut outputs = String::from("year,industry,quantity_change\n");

    for year in 1970..=2009 {
        for industry in ["211", "212"] {
            let qc: f64 = rng.gen_range(-0.1..0.1);
            let x325: f64 = rng.gen_range(-0.5..0.5);
            let x326: f64 = rng.gen_range(-0.5..0.5);
            let focus_adj = x325 - x326 + noise.sample(&mut rng);

            for commodity in COMMODITIES {
                let centered = match (industry, commodity) {
                    ("211", "327") if year == 1980 => -1.0,
                    ("212", "324") if year == 1975 => -1.0,
                    (_, "324") => focus_adj + qc,
                    (_, "325") => x325 + qc,
                    (_, "326") => x326 + qc,
                    _ => rng.gen_range(-0.2..0.2),
                };
                writeln!(inputs, "{year},{industry},{commodity},{}", centered + 1.0).unwrap();
            }
            writeln!(outputs, "{year},{industry},{}", qc + 1.0).unwrap();
        }
    }

    fs::write(input_path, inputs).unwrap();
    fs::write(output_path, outputs).unwrap();
}
