use crate::{
    robot::CarControls,
    sensor::{GpsReading, ImageRequest, ImageResponse, LidarReading},
};

/// Request/response access to a vehicle simulator.
///
/// Every call is blocking. Errors are transport failures and are not retried by
/// callers: they are expected to abort whatever loop is talking to the simulator.
pub trait SimulatorClient {
    /// Checks that the simulator is reachable.
    fn confirm_connection(&mut self) -> anyhow::Result<()>;

    /// Hands control of the vehicle to (or takes it back from) the API.
    fn enable_api_control(&mut self, enabled: bool) -> anyhow::Result<()>;

    /// Latest sweep of the named lidar.
    fn lidar_data(&mut self, lidar_name: &str) -> anyhow::Result<LidarReading>;

    /// Latest navigation reading of the vehicle.
    fn gps_data(&mut self) -> anyhow::Result<GpsReading>;

    /// One response per request, in request order.
    fn sim_get_images(
        &mut self,
        requests: &[ImageRequest],
        vehicle_name: &str,
    ) -> anyhow::Result<Vec<ImageResponse>>;

    fn set_car_controls(
        &mut self,
        controls: &CarControls,
        vehicle_name: &str,
    ) -> anyhow::Result<()>;
}
