//! Periodic heartbeat to the scheduler.

use datavault_common::{HEARTBEAT_PERIOD, RPC_DEADLINE};
use datavault_proto::scheduler::scheduler_service_client::SchedulerServiceClient;
use datavault_proto::scheduler::HeartbeatRequest;
use tokio::time::MissedTickBehavior;
use tonic::transport::Channel;
use tracing::{debug, warn};

/// Send one heartbeat per `HEARTBEAT_PERIOD`, forever.
///
/// The connection is created lazily and dropped on any failure, so a
/// scheduler restart just costs a few missed beats. Failures are logged
/// and never kill the worker: as long as the scheduler is down no
/// placement targets this worker anyway.
pub async fn heartbeat_loop(scheduler_endpoint: String, worker_id: String, advertise_addr: String) {
    let mut ticker = tokio::time::interval(HEARTBEAT_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut client: Option<SchedulerServiceClient<Channel>> = None;

    loop {
        ticker.tick().await;

        if client.is_none() {
            match SchedulerServiceClient::connect(scheduler_endpoint.clone()).await {
                Ok(connected) => client = Some(connected),
                Err(e) => {
                    warn!("scheduler unreachable, skipping heartbeat: {e}");
                    continue;
                }
            }
        }
        let Some(connected) = client.as_mut() else {
            continue;
        };

        let request = HeartbeatRequest {
            worker_id: worker_id.clone(),
            address: advertise_addr.clone(),
        };
        match tokio::time::timeout(RPC_DEADLINE, connected.send_heartbeat(request)).await {
            Ok(Ok(response)) => {
                debug!(%worker_id, "heartbeat acknowledged: {}", response.into_inner().message);
            }
            Ok(Err(status)) => {
                warn!(%worker_id, "heartbeat rejected: {status}");
                client = None;
            }
            Err(_) => {
                warn!(%worker_id, "heartbeat timed out");
                client = None;
            }
        }
    }
}
