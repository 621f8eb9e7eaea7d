pub mod fetch;
pub mod list;
pub mod serve;

use anyhow::{Context, Result};
use ndnft_face::face::Face;
use ndnft_face::mgmt::MgmtClient;
use ndnft_face::transport::unix_datagram_transport;

/// Create the forwarder-side face over GraphQL and attach a local
/// transport to the socket path it hands back.
pub fn open_face(gqlserver: &str, mtu: usize, app_name: &str) -> Result<(Face, MgmtClient)> {
    let mut mgmt = MgmtClient::new(gqlserver);

    let socket_name = format!("/run/ndn/{}-{}.sock", app_name, std::process::id());
    let info = mgmt
        .create_face(&socket_name, mtu)
        .context("creating forwarder face")?;

    let local_path = format!("{}.local", info.socket_path);
    let (tx, rx) = unix_datagram_transport(&local_path, &info.socket_path)
        .context("attaching to face socket")?;

    let face_id: u32 = info.face_id.parse().unwrap_or(0);
    let face = Face::new(face_id, Box::new(tx), Box::new(rx)).context("starting face")?;

    Ok((face, mgmt))
}
