use super::packet::{Instruction, Packet, PacketKind};
use crate::error::{HardwareError, Result};
use crate::traits::FingerprintDriver;
use crate::types::{CharBuffer, ConfirmationCode, DriverCapabilities, FingerprintImage, SearchHit};
use bytes::Bytes;
use ridgeline_core::SensorConfig;
use ridgeline_core::constants::{IMAGE_HEIGHT, IMAGE_WIDTH};
use std::io::{Read, Write};
use tracing::{debug, trace, warn};

/// Packed image size: two 4-bit pixels per byte.
const PACKED_IMAGE_LEN: usize = IMAGE_WIDTH as usize * IMAGE_HEIGHT as usize / 2;

/// Acknowledge packet split into its confirmation code and trailing data.
#[derive(Debug)]
struct Ack {
    code: ConfirmationCode,
    data: Bytes,
}

impl Ack {
    fn u16_at(&self, offset: usize) -> Result<u16> {
        match self.data.get(offset..offset + 2) {
            Some(&[hi, lo]) => Ok(u16::from_be_bytes([hi, lo])),
            _ => Err(HardwareError::invalid_data(format!(
                "Acknowledge too short: {} data bytes",
                self.data.len()
            ))),
        }
    }
}

/// Driver for an R307/ZFM sensor on a byte-stream transport.
///
/// Each primitive is one command/acknowledge exchange. The exchange itself is
/// blocking I/O, so it runs on Tokio's blocking pool with the transport moved
/// in and handed back afterwards. If that worker dies the transport is lost
/// and every later call reports [`HardwareError::Disconnected`].
///
/// # Examples
///
/// Any `Read + Write` stream will do; `SerialConnector` opens the system
/// serial port when the `hardware-serial` feature is enabled.
///
/// ```no_run
/// use std::io::Cursor;
///
/// use ridgeline_core::SensorConfig;
/// use ridgeline_hardware::r307::R307Driver;
/// use ridgeline_hardware::traits::FingerprintDriver;
///
/// # async fn example() -> ridgeline_hardware::Result<()> {
/// let config = SensorConfig::new("/dev/ttyUSB0");
/// let transport = Cursor::new(Vec::<u8>::new());
///
/// let mut driver = R307Driver::new(transport, &config);
/// assert!(driver.verify_password().await?);
/// # Ok(())
/// # }
/// ```
pub struct R307Driver<T> {
    port: Option<T>,
    name: String,
    address: u32,
    password: u32,
}

impl<T> R307Driver<T>
where
    T: Read + Write + Send + 'static,
{
    pub fn new(transport: T, config: &SensorConfig) -> Self {
        Self {
            port: Some(transport),
            name: config.port.clone(),
            address: config.address,
            password: config.password,
        }
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Give the transport back, if it is still held.
    pub fn into_inner(mut self) -> Option<T> {
        self.port.take()
    }

    /// Run blocking transport work on the blocking pool.
    async fn with_port<R, F>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut T, u32) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let mut port = self
            .port
            .take()
            .ok_or_else(|| HardwareError::disconnected(self.name.as_str()))?;
        let address = self.address;

        let (port, result) = tokio::task::spawn_blocking(move || {
            let result = f(&mut port, address);
            (port, result)
        })
        .await
        .map_err(|e| {
            warn!("Serial worker for {} failed: {}", self.name, e);
            HardwareError::communication(format!("serial worker failed: {e}"))
        })?;

        self.port = Some(port);
        result
    }

    async fn command(&mut self, instruction: Instruction, params: Vec<u8>) -> Result<Ack> {
        debug!("{} <- {:?} {:02X?}", self.name, instruction, params);
        let ack = self
            .with_port(move |port, address| exchange(port, address, instruction, &params))
            .await?;
        debug!("{} -> {:?} {}", self.name, instruction, ack.code);
        Ok(ack)
    }

    async fn simple(
        &mut self,
        operation: &'static str,
        instruction: Instruction,
        params: Vec<u8>,
    ) -> Result<()> {
        self.command(instruction, params)
            .await?
            .code
            .into_result(operation)
    }
}

fn exchange<T: Read + Write>(
    port: &mut T,
    address: u32,
    instruction: Instruction,
    params: &[u8],
) -> Result<Ack> {
    let packet = Packet::command(address, instruction, params);
    let bytes = packet.encode();
    trace!("write {:02X?}", bytes.as_ref());
    port.write_all(&bytes)?;
    port.flush()?;
    read_ack(port)
}

fn read_ack<T: Read>(port: &mut T) -> Result<Ack> {
    let reply = Packet::read_from(port)?;
    if reply.kind != PacketKind::Ack {
        return Err(HardwareError::invalid_data(format!(
            "Expected acknowledge, got {:?}",
            reply.kind
        )));
    }
    let Some(&code) = reply.payload.first() else {
        return Err(HardwareError::invalid_data("Empty acknowledge"));
    };
    Ok(Ack {
        code: ConfirmationCode(code),
        data: reply.payload.slice(1..),
    })
}

fn read_image_data<T: Read>(port: &mut T) -> Result<Vec<u8>> {
    let mut packed = Vec::with_capacity(PACKED_IMAGE_LEN);
    loop {
        let packet = Packet::read_from(port)?;
        match packet.kind {
            PacketKind::Data | PacketKind::EndData => {
                packed.extend_from_slice(&packet.payload);
                if packed.len() > PACKED_IMAGE_LEN {
                    return Err(HardwareError::invalid_data(format!(
                        "Image larger than {PACKED_IMAGE_LEN} bytes"
                    )));
                }
                if packet.kind == PacketKind::EndData {
                    return Ok(packed);
                }
            }
            other => {
                return Err(HardwareError::invalid_data(format!(
                    "Unexpected {other:?} packet during image upload"
                )));
            }
        }
    }
}

fn slot_params(buffer: CharBuffer, position: u16) -> Vec<u8> {
    let [hi, lo] = position.to_be_bytes();
    vec![buffer.id(), hi, lo]
}

impl<T> FingerprintDriver for R307Driver<T>
where
    T: Read + Write + Send + 'static,
{
    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities::FULL
    }

    async fn verify_password(&mut self) -> Result<bool> {
        let ack = self
            .command(Instruction::VfyPwd, self.password.to_be_bytes().to_vec())
            .await?;
        match ack.code {
            ConfirmationCode::OK => Ok(true),
            ConfirmationCode::WRONG_PASSWORD => Ok(false),
            code => Err(HardwareError::rejected("verify_password", code)),
        }
    }

    async fn read_image(&mut self) -> Result<bool> {
        let ack = self.command(Instruction::GenImg, Vec::new()).await?;
        match ack.code {
            ConfirmationCode::OK => Ok(true),
            ConfirmationCode::NO_FINGER => Ok(false),
            code => Err(HardwareError::rejected("read_image", code)),
        }
    }

    async fn convert_image(&mut self, buffer: CharBuffer) -> Result<()> {
        self.simple("convert_image", Instruction::Img2Tz, vec![buffer.id()])
            .await
    }

    async fn compare_characteristics(&mut self) -> Result<u16> {
        let ack = self.command(Instruction::Match, Vec::new()).await?;
        match ack.code {
            ConfirmationCode::OK => ack.u16_at(0),
            ConfirmationCode::NO_MATCH => Ok(0),
            code => Err(HardwareError::rejected("compare_characteristics", code)),
        }
    }

    async fn create_template(&mut self) -> Result<()> {
        self.simple("create_template", Instruction::RegModel, Vec::new())
            .await
    }

    async fn store_template(&mut self, position: u16, buffer: CharBuffer) -> Result<()> {
        self.simple("store_template", Instruction::Store, slot_params(buffer, position))
            .await
    }

    async fn search_template(
        &mut self,
        buffer: CharBuffer,
        start: u16,
        count: u16,
    ) -> Result<SearchHit> {
        let mut params = slot_params(buffer, start);
        params.extend_from_slice(&count.to_be_bytes());
        let ack = self.command(Instruction::Search, params).await?;
        match ack.code {
            ConfirmationCode::OK => Ok(SearchHit::new(
                i32::from(ack.u16_at(0)?),
                ack.u16_at(2)?,
            )),
            ConfirmationCode::NOT_FOUND => Ok(SearchHit::no_match()),
            code => Err(HardwareError::rejected("search_template", code)),
        }
    }

    async fn template_count(&mut self) -> Result<u16> {
        let ack = self.command(Instruction::TemplateNum, Vec::new()).await?;
        ack.code.into_result("template_count")?;
        ack.u16_at(0)
    }

    async fn load_template(&mut self, position: u16, buffer: CharBuffer) -> Result<()> {
        self.simple("load_template", Instruction::LoadChar, slot_params(buffer, position))
            .await
    }

    async fn delete_template(&mut self, position: u16) -> Result<()> {
        let [hi, lo] = position.to_be_bytes();
        self.simple("delete_template", Instruction::DeleteChar, vec![hi, lo, 0x00, 0x01])
            .await
    }

    async fn clear_database(&mut self) -> Result<()> {
        self.simple("clear_database", Instruction::Empty, Vec::new())
            .await
    }

    async fn download_image(&mut self) -> Result<FingerprintImage> {
        debug!("{} <- {:?}", self.name, Instruction::UpImage);
        let packed = self
            .with_port(|port, address| {
                exchange(port, address, Instruction::UpImage, &[])?
                    .code
                    .into_result("download_image")?;
                read_image_data(port)
            })
            .await?;
        FingerprintImage::from_packed_nibbles(IMAGE_WIDTH, IMAGE_HEIGHT, &packed)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed serial transport {}", self.name);
        }
    }
}

impl<T> std::fmt::Debug for R307Driver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("R307Driver")
            .field("port", &self.name)
            .field("address", &format_args!("{:#010X}", self.address))
            .field("open", &self.port.is_some())
            .finish()
    }
}
