//! JSON emitters and parser for simulation results.
//!
//! Two historical wire formats exist for the same data and neither is
//! canonical, so both are kept behind a selector. `States` is the full
//! schema and the only one that can be parsed back; `Network` is the
//! compact per-state form consumed by visualization front ends.

use serde_json::json;

use crate::types::SimulationResult;
use crate::ResultsResult;

/// Output format selector for [`SimulationResult::to_json`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonFormat {
    /// Full schema: chip, fluids, droplets, injections and states. Round
    /// trips through [`SimulationResult::from_json`].
    #[default]
    States,
    /// Compact per-state view: `{"network": [{time, nodes, channels,
    /// bigDroplets}, ...]}`.
    Network,
}

impl SimulationResult {
    /// Serialize in the given format.
    pub fn to_json(&self, format: JsonFormat) -> ResultsResult<String> {
        let out = match format {
            JsonFormat::States => serde_json::to_string(self)?,
            JsonFormat::Network => serde_json::to_string(&network_value(self))?,
        };
        Ok(out)
    }

    /// Serialize in the given format with indentation.
    pub fn to_json_pretty(&self, format: JsonFormat) -> ResultsResult<String> {
        let out = match format {
            JsonFormat::States => serde_json::to_string_pretty(self)?,
            JsonFormat::Network => serde_json::to_string_pretty(&network_value(self))?,
        };
        Ok(out)
    }

    /// Parse a result serialized in [`JsonFormat::States`].
    pub fn from_json(json: &str) -> ResultsResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn network_value(result: &SimulationResult) -> serde_json::Value {
    let states: Vec<serde_json::Value> = result
        .states
        .iter()
        .map(|state| {
            let nodes: Vec<_> = state
                .pressures
                .values()
                .map(|pressure| json!({ "pressure": pressure }))
                .collect();

            let channels: Vec<_> = state
                .flow_rates
                .values()
                .map(|flow_rate| json!({ "flowRate": flow_rate }))
                .collect();

            let big_droplets: Vec<_> = state
                .droplet_positions
                .iter()
                .map(|(droplet_id, position)| {
                    let boundaries: Vec<_> = position
                        .boundaries
                        .iter()
                        .map(|b| {
                            json!({
                                "volumeTowards0": b.volume_towards0,
                                "position": {
                                    "channelId": b.position.channel_id,
                                    "position": b.position.position,
                                },
                            })
                        })
                        .collect();

                    json!({
                        "id": droplet_id,
                        "fluid": result.droplets.get(droplet_id).map(|d| d.fluid_id),
                        "boundaries": boundaries,
                        "channels": position.channel_ids,
                    })
                })
                .collect();

            json!({
                "time": state.time,
                "nodes": nodes,
                "channels": channels,
                "bigDroplets": big_droplets,
            })
        })
        .collect();

    json!({ "network": states })
}
