use std::error::Error;

use ffm::model_instance::ModelInstance;
use ffm::persistence::{new_regressor_from_filename, save_regressor_to_filename};
use ffm::regressor::Regressor;
use ffm::{cmdline, logging_layer};

fn main() {
    logging_layer::initialize_logging_layer();

    if let Err(e) = main_ffm() {
        log::error!("Global error: {:?}", e);
        std::process::exit(1)
    }
}

fn main_ffm() -> Result<(), Box<dyn Error>> {
    let cl = cmdline::parse();

    let re = match cl.value_of("initial_regressor") {
        Some(filename) => {
            log::info!("initial_regressor = {}", filename);
            log::warn!("Command line model parameters will be ignored");
            new_regressor_from_filename(filename)?
        }
        None => {
            let mi = ModelInstance::new_from_cmdline(&cl)?;
            Regressor::new(&mi)?
        }
    };

    if let Some(filename) = cl.value_of("final_regressor") {
        log::info!("final_regressor = {}", filename);
        save_regressor_to_filename(filename, &re)?;
    }

    if cl.is_present("describe") {
        println!("{}", serde_json::to_string_pretty(&re.describe()?)?);
    }

    Ok(())
}
