use clap::{App, AppSettings, Arg};

pub fn parse<'a>() -> clap::ArgMatches<'a> {
    create_expected_args().get_matches()
}

pub fn create_expected_args<'a>() -> App<'a, 'a> {
    App::new("ffm")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Field-aware factorization machine kernel: build, save and inspect models")
        .setting(AppSettings::DeriveDisplayOrder)
        .arg(Arg::with_name("seed")
            .long("seed")
            .value_name("u64")
            .help("Seed for embedding initialization")
            .takes_value(true))
        .arg(Arg::with_name("restricted")
            .long("restricted")
            .help("Only compute interactions between upper-field outer and lower-field inner features")
            .takes_value(false))
        .arg(Arg::with_name("learning_rate")
            .long("learning_rate")
            .short("l")
            .value_name("0.2")
            .help("Learning rate (eta)")
            .takes_value(true))
        .arg(Arg::with_name("l2")
            .long("l2")
            .value_name("0.00002")
            .help("L2 regularization (lambda)")
            .takes_value(true))
        .arg(Arg::with_name("field_count")
            .long("field_count")
            .value_name("30")
            .help("Number of fields")
            .takes_value(true))
        .arg(Arg::with_name("embedding_dim")
            .long("embedding_dim")
            .short("k")
            .value_name("14")
            .help("Embedding dimensionality")
            .takes_value(true))
        .arg(Arg::with_name("hash_bits")
            .long("hash_bits")
            .short("b")
            .value_name("18")
            .help("Number of bits of the feature id, the rest of the packed index is the field")
            .takes_value(true))
        .arg(Arg::with_name("init_acc_gradient")
            .long("init_acc_gradient")
            .value_name("1.0")
            .help("Initial value of adaptive gradient accumulators")
            .takes_value(true))
        .arg(Arg::with_name("min_a_field")
            .long("min_a_field")
            .value_name("field")
            .help("Override: lowest field an outer feature may have")
            .takes_value(true))
        .arg(Arg::with_name("max_b_field")
            .long("max_b_field")
            .value_name("field")
            .help("Override: highest field an inner feature may have")
            .takes_value(true))
        .arg(Arg::with_name("initial_regressor")
            .long("initial_regressor")
            .short("i")
            .value_name("filename")
            .help("Load model from this file, model parameters on the command line are ignored")
            .takes_value(true))
        .arg(Arg::with_name("final_regressor")
            .long("final_regressor")
            .short("f")
            .value_name("filename")
            .help("Save model to this file")
            .takes_value(true))
        .arg(Arg::with_name("describe")
            .long("describe")
            .help("Print model configuration and parameter summary as JSON")
            .takes_value(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_instance::ModelInstance;

    #[test]
    fn test_cmdline_to_model_instance() {
        let cl = create_expected_args().get_matches_from(vec![
            "ffm", "--seed", "9", "--restricted", "-l", "0.05", "--l2", "0.001", "--field_count", "12",
            "-k", "4", "-b", "10", "--max_b_field", "5",
        ]);
        let mi = ModelInstance::new_from_cmdline(&cl).unwrap();
        assert_eq!(mi.seed, 9);
        assert!(mi.restricted);
        assert_eq!(mi.learning_rate, 0.05);
        assert_eq!(mi.l2, 0.001);
        assert_eq!(mi.field_count, 12);
        assert_eq!(mi.embedding_dim, 4);
        assert_eq!(mi.hash_bits, 10);
        assert_eq!(mi.restriction_bounds(), (4, 5));
    }

    #[test]
    fn test_cmdline_invalid_values() {
        let cl = create_expected_args().get_matches_from(vec!["ffm", "-k", "zero"]);
        assert!(ModelInstance::new_from_cmdline(&cl).is_err());
        let cl = create_expected_args().get_matches_from(vec!["ffm", "-k", "0"]);
        assert!(ModelInstance::new_from_cmdline(&cl).is_err());
    }

    #[test]
    fn test_cmdline_defaults() {
        let cl = create_expected_args().get_matches_from(vec!["ffm"]);
        let mi = ModelInstance::new_from_cmdline(&cl).unwrap();
        assert_eq!(mi, ModelInstance::new_empty().unwrap());
    }
}
