// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Consumers of the output ring: Linrad datagram export, the Linrad control
//! listener and a raw PCM file sink.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use iqduo_core::{Iq, OutputReader, OutputRing, Purpose};
use iqduo_protocol::linrad::control_response;
use iqduo_protocol::{pcm, PcmLayout, ProtocolError, Raw16Packetizer, Timf2Packetizer};

use crate::config::NetworkFormat;

/// Ring polling period for every consumer.
const DRAIN_INTERVAL: Duration = Duration::from_millis(10);

/// Settings for the UDP exporter.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub format: NetworkFormat,
    pub dest: String,
    pub dual: bool,
    pub centre_khz: f64,
    pub sample_rate: u32,
}

/// Turns ring contents into complete datagrams.
pub enum Framer {
    Timf2 {
        packetizer: Timf2Packetizer,
        a: OutputReader,
        b: OutputReader,
    },
    Raw16 {
        packetizer: Raw16Packetizer,
        a: OutputReader,
        b: OutputReader,
    },
}

impl Framer {
    pub fn new(settings: &ExportSettings, ring: &Arc<OutputRing>) -> Self {
        match settings.format {
            NetworkFormat::Timf2 => Self::Timf2 {
                packetizer: Timf2Packetizer::new(
                    settings.dual,
                    settings.centre_khz,
                    settings.sample_rate,
                ),
                a: ring.reader(Purpose::NetworkA),
                b: ring.reader(Purpose::NetworkB),
            },
            NetworkFormat::Raw16 => Self::Raw16 {
                packetizer: Raw16Packetizer::new(),
                a: ring.reader(Purpose::SoundcardA),
                b: ring.reader(Purpose::SoundcardB),
            },
        }
    }

    fn samples_per_packet(&self) -> usize {
        match self {
            Self::Timf2 { packetizer, .. } => packetizer.samples_per_packet(),
            Self::Raw16 { .. } => Raw16Packetizer::SAMPLES_PER_PACKET,
        }
    }

    /// Frame every complete packet currently buffered.
    pub fn drain(&mut self, time: i32) -> Result<Vec<Bytes>, ProtocolError> {
        let n = self.samples_per_packet();
        let mut buf_a = vec![Iq::new(0.0, 0.0); n];
        let mut buf_b = vec![Iq::new(0.0, 0.0); n];
        let mut packets = Vec::new();
        match self {
            Self::Timf2 { packetizer, a, b } => {
                while a.available() >= n && b.available() >= n {
                    a.read_into(&mut buf_a);
                    b.read_into(&mut buf_b);
                    packets.push(packetizer.packet(&buf_a, &buf_b, time)?);
                }
            }
            Self::Raw16 { packetizer, a, b } => {
                while a.available() >= n && b.available() >= n {
                    a.read_into(&mut buf_a);
                    b.read_into(&mut buf_b);
                    packets.push(packetizer.packet(&buf_a, &buf_b, time)?);
                }
            }
        }
        Ok(packets)
    }
}

/// Send datagrams to `settings.dest` until shutdown.
pub async fn run_network_export(
    settings: ExportSettings,
    ring: Arc<OutputRing>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(&settings.dest).await?;
    info!(
        "Exporting {:?} datagrams to {} ({})",
        settings.format,
        settings.dest,
        if settings.dual { "A+B" } else { "A" }
    );

    let mut framer = Framer::new(&settings, &ring);
    let started = Instant::now();
    let mut interval = tokio::time::interval(DRAIN_INTERVAL);
    let mut sent: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
        }

        let time = started.elapsed().as_millis() as i32;
        let packets = match framer.drain(time) {
            Ok(packets) => packets,
            Err(e) => {
                error!("Framing failed: {}", e);
                continue;
            }
        };
        for packet in packets {
            if let Err(e) = socket.send(&packet).await {
                // Nobody listening yet is normal for UDP.
                debug!("Datagram send failed: {}", e);
            }
            sent += 1;
        }
    }
    info!("Network export stopped after {} datagrams", sent);
    Ok(())
}

/// Answer Linrad control requests over TCP.
pub async fn run_control_listener(
    addr: SocketAddr,
    sample_rate: u32,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Linrad control listening on {}", addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                info!("Control client connected: {}", peer);
                tokio::spawn(async move {
                    if let Err(e) = handle_control(socket, peer, sample_rate).await {
                        warn!("Control client {} error: {:?}", peer, e);
                    }
                });
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn handle_control(
    mut socket: TcpStream,
    peer: SocketAddr,
    sample_rate: u32,
) -> std::io::Result<()> {
    let mut request = [0u8; 64];
    loop {
        let n = socket.read(&mut request).await?;
        if n == 0 {
            info!("Control client {} disconnected", peer);
            return Ok(());
        }
        for byte in &request[..n] {
            match control_response(std::slice::from_ref(byte), sample_rate) {
                Some(reply) => socket.write_all(&reply).await?,
                None => debug!("Ignoring control byte {:#04x} from {}", byte, peer),
            }
        }
        socket.flush().await?;
    }
}

/// Encode soundcard-format samples as PCM.
pub struct PcmEncoder {
    layout: PcmLayout,
    a: OutputReader,
    b: OutputReader,
    scratch_a: Vec<Iq>,
    scratch_b: Vec<Iq>,
}

impl PcmEncoder {
    /// With a stereo layout only `A` (or `B` when `select_b`) is encoded.
    pub fn new(layout: PcmLayout, select_b: bool, ring: &Arc<OutputRing>) -> Self {
        let (a, b) = if layout == PcmLayout::Stereo && select_b {
            (ring.reader(Purpose::SoundcardB), ring.reader(Purpose::SoundcardA))
        } else {
            (ring.reader(Purpose::SoundcardA), ring.reader(Purpose::SoundcardB))
        };
        Self {
            layout,
            a,
            b,
            scratch_a: Vec::new(),
            scratch_b: Vec::new(),
        }
    }

    /// Encode everything unread into `buf`; returns the frame count.
    pub fn drain(&mut self, buf: &mut BytesMut) -> usize {
        let n = self.a.available();
        self.scratch_a.resize(n, Iq::new(0.0, 0.0));
        let n = self.a.read_into(&mut self.scratch_a);
        match self.layout {
            PcmLayout::Stereo => {
                self.b.skip_to_latest();
                pcm::encode_stereo(&self.scratch_a[..n], buf);
            }
            PcmLayout::Quad => {
                self.scratch_b.resize(n, Iq::new(0.0, 0.0));
                let m = self.b.read_into(&mut self.scratch_b);
                pcm::encode_quad(&self.scratch_a[..n], &self.scratch_b[..m], buf);
            }
        }
        n
    }
}

/// Append PCM to `path` until shutdown.
pub async fn run_pcm_sink(
    path: PathBuf,
    layout: PcmLayout,
    select_b: bool,
    ring: Arc<OutputRing>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    info!(
        "Writing {}-channel PCM to {}",
        layout.channels(),
        path.display()
    );

    let mut encoder = PcmEncoder::new(layout, select_b, &ring);
    let mut buf = BytesMut::new();
    let mut interval = tokio::time::interval(DRAIN_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
        }
        if encoder.drain(&mut buf) > 0 {
            file.write_all(&buf).await?;
            buf.clear();
        }
    }
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use iqduo_protocol::linrad::{NetRxHeader, DATAGRAM_LEN, HEADER_LEN};

    fn ramp(n: usize) -> Vec<Iq> {
        (0..n).map(|k| Iq::new(k as f64, -(k as f64))).collect()
    }

    fn settings(format: NetworkFormat, dual: bool) -> ExportSettings {
        ExportSettings {
            format,
            dest: "127.0.0.1:0".to_string(),
            dual,
            centre_khz: 10_125.0,
            sample_rate: 96_000,
        }
    }

    #[test]
    fn test_timf2_framer_waits_for_full_packets() {
        let ring = Arc::new(OutputRing::with_capacity(4096));
        let mut framer = Framer::new(&settings(NetworkFormat::Timf2, false), &ring);
        let data = ramp(300);
        ring.publish(
            300,
            &[(Purpose::NetworkA, &data[..]), (Purpose::NetworkB, &data[..])],
        );
        let packets = framer.drain(0).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), DATAGRAM_LEN);
        let header = NetRxHeader::decode(&packets[0][..HEADER_LEN]).unwrap();
        assert_eq!(header.userx_no, -1);

        // 126 left over; 48 more completes the second packet.
        assert!(framer.drain(0).unwrap().is_empty());
        let more = ramp(48);
        ring.publish(
            48,
            &[(Purpose::NetworkA, &more[..]), (Purpose::NetworkB, &more[..])],
        );
        assert_eq!(framer.drain(0).unwrap().len(), 1);
    }

    #[test]
    fn test_raw16_framer_reads_soundcard_buffers() {
        let ring = Arc::new(OutputRing::with_capacity(4096));
        let mut framer = Framer::new(&settings(NetworkFormat::Raw16, true), &ring);
        let data = ramp(Raw16Packetizer::SAMPLES_PER_PACKET * 2);
        let zeros = vec![Iq::new(0.0, 0.0); data.len()];
        ring.publish(
            data.len(),
            &[
                (Purpose::NetworkA, &zeros[..]),
                (Purpose::SoundcardA, &data[..]),
                (Purpose::SoundcardB, &data[..]),
            ],
        );
        let packets = framer.drain(5).unwrap();
        assert_eq!(packets.len(), 2);
        let header = NetRxHeader::decode(&packets[1][..HEADER_LEN]).unwrap();
        assert_eq!(header.passband_direction, 1);
        assert_eq!(header.time, 5);
        // Second packet starts at sample 174: IA = 174, QA = -174.
        assert_eq!(&packets[1][HEADER_LEN..HEADER_LEN + 2], &174i16.to_le_bytes());
        assert_eq!(
            &packets[1][HEADER_LEN + 2..HEADER_LEN + 4],
            &(-174i16).to_le_bytes()
        );
    }

    #[test]
    fn test_pcm_encoder_stereo_select_b() {
        let ring = Arc::new(OutputRing::with_capacity(64));
        let mut encoder = PcmEncoder::new(PcmLayout::Stereo, true, &ring);
        let a = vec![Iq::new(1.0, 1.0); 3];
        let b = vec![Iq::new(2.0, -2.0); 3];
        ring.publish(3, &[(Purpose::SoundcardA, &a[..]), (Purpose::SoundcardB, &b[..])]);

        let mut buf = BytesMut::new();
        assert_eq!(encoder.drain(&mut buf), 3);
        assert_eq!(buf.len(), 3 * PcmLayout::Stereo.bytes_per_frame());
        assert_eq!(&buf[..4], &[2, 0, 0xfe, 0xff]);
    }

    #[test]
    fn test_pcm_encoder_quad() {
        let ring = Arc::new(OutputRing::with_capacity(64));
        let mut encoder = PcmEncoder::new(PcmLayout::Quad, false, &ring);
        let a = vec![Iq::new(1.0, 2.0); 5];
        let b = vec![Iq::new(3.0, 4.0); 5];
        ring.publish(5, &[(Purpose::SoundcardA, &a[..]), (Purpose::SoundcardB, &b[..])]);

        let mut buf = BytesMut::new();
        assert_eq!(encoder.drain(&mut buf), 5);
        assert_eq!(buf.len(), 5 * PcmLayout::Quad.bytes_per_frame());
        assert_eq!(&buf[..8], &[1, 0, 2, 0, 3, 0, 4, 0]);
        assert_eq!(encoder.drain(&mut buf), 0);
    }

    #[tokio::test]
    async fn test_control_listener_answers_mode_request() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let server = tokio::spawn(run_control_listener(addr, 96_000, shutdown_rx));
        let mut client = None;
        for _ in 0..50 {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    client = Some(stream);
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        let mut client = client.expect("control listener did not start");

        client.write_all(&[0xb8, 0xb5]).await.unwrap();
        let mut reply = [0u8; 33];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply[..4], &96_000i32.to_le_bytes());
        assert_eq!(reply[32], 0x00);

        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
    }
}
