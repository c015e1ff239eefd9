use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::error::Error;
use std::fs;
use std::io;
use std::io::{Read, Write};

use crate::consts::LANES;
use crate::model_instance::ModelInstance;
use crate::optimizer::WeightAndAccumulator;
use crate::regressor::Regressor;
use crate::simd::F32x8;

const REGRESSOR_HEADER_MAGIC_STRING: &[u8; 4] = b"FFMW"; // FFM Weights
const REGRESSOR_HEADER_VERSION: u32 = 1;

impl ModelInstance {
    pub fn save_to_buf(&self, output_bufwriter: &mut dyn io::Write) -> Result<(), Box<dyn Error>> {
        let serialized = serde_json::to_vec_pretty(&self)?;
        output_bufwriter.write_u64::<LittleEndian>(serialized.len() as u64)?;
        output_bufwriter.write_all(&serialized)?;
        Ok(())
    }

    pub fn new_from_buf(input_bufreader: &mut dyn io::Read) -> Result<ModelInstance, Box<dyn Error>> {
        let len = input_bufreader.read_u64::<LittleEndian>()?;
        let mi: ModelInstance = serde_json::from_reader(input_bufreader.take(len))?;
        mi.validate()?;
        Ok(mi)
    }
}

fn write_regressor_header(output_bufwriter: &mut dyn io::Write) -> Result<(), Box<dyn Error>> {
    // Magic string, then 32 bit unsigned version
    output_bufwriter.write_all(REGRESSOR_HEADER_MAGIC_STRING)?;
    output_bufwriter.write_u32::<LittleEndian>(REGRESSOR_HEADER_VERSION)?;
    Ok(())
}

fn verify_header(input_bufreader: &mut dyn io::Read) -> Result<(), Box<dyn Error>> {
    let mut magic_string: [u8; 4] = [0; 4];
    input_bufreader.read_exact(&mut magic_string)?;
    if &magic_string != REGRESSOR_HEADER_MAGIC_STRING {
        return Err("Regressor header does not begin with magic bytes FFMW")?;
    }

    let version = input_bufreader.read_u32::<LittleEndian>()?;
    if REGRESSOR_HEADER_VERSION != version {
        return Err(format!(
            "Regressor version of this binary: {}, version of the regressor file: {}",
            REGRESSOR_HEADER_VERSION, version
        ))?;
    }
    Ok(())
}

impl Regressor {
    /// Weight count first, then bias, linear pairs and the embedding arena, all little endian f32
    pub fn write_weights_to_buf(&self, output_bufwriter: &mut dyn io::Write) -> Result<(), Box<dyn Error>> {
        let ws = &self.weights;
        output_bufwriter.write_u64::<LittleEndian>(ws.get_serialized_len() as u64)?;
        output_bufwriter.write_f32::<LittleEndian>(ws.bias.weight)?;
        output_bufwriter.write_f32::<LittleEndian>(ws.bias.acc_grad)?;
        for w in ws.linear.iter() {
            output_bufwriter.write_f32::<LittleEndian>(w.weight)?;
            output_bufwriter.write_f32::<LittleEndian>(w.acc_grad)?;
        }
        for chunk in ws.embeddings.iter() {
            for lane in chunk.0.iter() {
                output_bufwriter.write_f32::<LittleEndian>(*lane)?;
            }
        }
        Ok(())
    }

    pub fn overwrite_weights_from_buf(&mut self, input_bufreader: &mut dyn io::Read) -> Result<(), Box<dyn Error>> {
        let ws = &mut self.weights;
        let len = input_bufreader.read_u64::<LittleEndian>()? as usize;
        if len != ws.get_serialized_len() {
            return Err(format!(
                "Number of weights in the file ({}) and number of weights allocated ({}) isn't the same",
                len,
                ws.get_serialized_len()
            ))?;
        }
        ws.bias = WeightAndAccumulator {
            weight: input_bufreader.read_f32::<LittleEndian>()?,
            acc_grad: input_bufreader.read_f32::<LittleEndian>()?,
        };
        let mut pair = [0.0f32; 2];
        for w in ws.linear.iter_mut() {
            input_bufreader.read_f32_into::<LittleEndian>(&mut pair)?;
            *w = WeightAndAccumulator { weight: pair[0], acc_grad: pair[1] };
        }
        let mut lanes = [0.0f32; LANES];
        for chunk in ws.embeddings.iter_mut() {
            input_bufreader.read_f32_into::<LittleEndian>(&mut lanes)?;
            *chunk = F32x8(lanes);
        }
        Ok(())
    }
}

pub fn save_regressor_to_buf(re: &Regressor, output_bufwriter: &mut dyn io::Write) -> Result<(), Box<dyn Error>> {
    write_regressor_header(output_bufwriter)?;
    re.model_instance().save_to_buf(output_bufwriter)?;
    re.write_weights_to_buf(output_bufwriter)?;
    Ok(())
}

pub fn new_regressor_from_buf(input_bufreader: &mut dyn io::Read) -> Result<Regressor, Box<dyn Error>> {
    verify_header(input_bufreader)?;
    let mi = ModelInstance::new_from_buf(input_bufreader)?;
    let mut re = Regressor::new_without_weights(&mi)?;
    re.overwrite_weights_from_buf(input_bufreader)?;
    // Update steps run over the whole aligned width, so broken padding would leak into predictions
    re.weights.check_padding()?;
    Ok(re)
}

pub fn save_regressor_to_filename(filename: &str, re: &Regressor) -> Result<(), Box<dyn Error>> {
    let mut output_bufwriter = io::BufWriter::new(fs::File::create(filename)?);
    save_regressor_to_buf(re, &mut output_bufwriter)?;
    output_bufwriter.flush()?;
    log::info!("Saved regressor to {}", filename);
    Ok(())
}

pub fn new_regressor_from_filename(filename: &str) -> Result<Regressor, Box<dyn Error>> {
    let mut input_bufreader = io::BufReader::new(fs::File::open(filename)?);
    let re = new_regressor_from_buf(&mut input_bufreader)?;
    log::info!("Loaded regressor from {}", filename);
    Ok(re)
}
