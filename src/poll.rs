//! Dashboard-facing replies.
//!
//! A dashboard keeps one plot per series and polls for changes. It sends back
//! the session id it was given plus the state hash of every plot it shows; the
//! handler answers with the plots to create and the plots to refetch. Plot data
//! is served separately by [`TimelineHandler::event_data`] and
//! [`TimelineHandler::tensor_data`].
//!
//! All types serialize with camelCase field names so a web layer can pass them
//! through unchanged.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::handler::TimelineHandler;
use crate::sanitize::{cleanse, Plotted};
use crate::timeline::{PercentileTrace, TimeAxes, Timeline};
use crate::token::random_token;
use crate::Result;

/// Whether the client must rebuild its view from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    New,
    Update,
}

/// Action the client should take for a newly reported plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotAction {
    /// Create a new group holding only this plot.
    New,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsPollRequest {
    /// Empty when the client has no session yet.
    pub session_id: String,
    /// Group id -> graph ids shown in that group.
    #[serde(default)]
    pub active: BTreeMap<String, Vec<String>>,
    /// Graph id -> state hash the client last fetched.
    #[serde(default)]
    pub states: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEventPlot {
    #[serde(rename = "type")]
    pub action: PlotAction,
    pub group_id: String,
    pub name: String,
    pub graph_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsPollResponse {
    pub update_type: UpdateType,
    pub session_id: String,
    pub new_plots: Vec<NewEventPlot>,
    /// Group id -> graphs to refetch, including the new ones.
    pub updates: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TensorsPollRequest {
    pub session_id: String,
    /// Graph div -> graph id drawn in it.
    #[serde(default)]
    pub active: BTreeMap<String, String>,
    #[serde(default)]
    pub states: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTensorPlot {
    #[serde(rename = "type")]
    pub action: PlotAction,
    pub graph_div: String,
    pub graph_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TensorsPollResponse {
    pub update_type: UpdateType,
    pub session_id: String,
    pub new_plots: Vec<NewTensorPlot>,
    /// Graph divs to refetch, including the new ones.
    pub updates: Vec<String>,
}

/// X values of a plot: integer steps or seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum XAxis {
    Steps(Vec<u64>),
    Seconds(Vec<f64>),
}

impl XAxis {
    /// Iteration when tracked, else epoch, else elapsed time.
    fn of(axes: Option<&TimeAxes>) -> Self {
        let Some(axes) = axes else {
            return XAxis::Steps(Vec::new());
        };
        if let Some(steps) = axes.iteration().or(axes.epoch()) {
            return XAxis::Steps(steps.to_vec());
        }
        XAxis::Seconds(axes.elapsed_time().map(<[f64]>::to_vec).unwrap_or_default())
    }
}

/// One sanitized percentile trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotTrace {
    pub label: String,
    pub data: Vec<Plotted>,
}

impl From<PercentileTrace> for PlotTrace {
    fn from(trace: PercentileTrace) -> Self {
        Self {
            data: cleanse(&trace.data),
            label: trace.label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plot<Y> {
    pub x: XAxis,
    pub y: Y,
    pub state_hash: String,
}

/// Plot data, or `{"exists": false}` when the session is stale or the id unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataReply<Y> {
    pub exists: bool,
    #[serde(flatten)]
    pub plot: Option<Plot<Y>>,
}

impl<Y> DataReply<Y> {
    fn missing() -> Self {
        Self {
            exists: false,
            plot: None,
        }
    }

    fn found(plot: Plot<Y>) -> Self {
        Self {
            exists: true,
            plot: Some(plot),
        }
    }
}

fn plot_of<S, Y>(timeline: &Timeline<S>, y: Y) -> Plot<Y> {
    Plot {
        x: XAxis::of(timeline.axes()),
        y,
        state_hash: timeline.state_hash().to_string(),
    }
}

impl TimelineHandler {
    /// Sanitized values of one event series.
    pub fn event_data(&self, session_id: &str, id: &str) -> Result<DataReply<Vec<Plotted>>> {
        let state = self.lock()?;
        if session_id != state.session_id {
            debug!(
                "session mismatch (it is {}, but request was {session_id})",
                state.session_id
            );
            return Ok(DataReply::missing());
        }
        Ok(match state.events.get(id) {
            Some(t) => DataReply::found(plot_of(t, cleanse(t.series().values()))),
            None => DataReply::missing(),
        })
    }

    /// Sanitized data percentiles of one tensor series.
    pub fn tensor_data(&self, session_id: &str, id: &str) -> Result<DataReply<Vec<PlotTrace>>> {
        let state = self.lock()?;
        if session_id != state.session_id {
            debug!(
                "session mismatch (it is {}, but request was {session_id})",
                state.session_id
            );
            return Ok(DataReply::missing());
        }
        Ok(match state.tensors.get(id) {
            Some(t) => {
                let traces = t.series().percentiles().into_iter().map(PlotTrace::from);
                DataReply::found(plot_of(t, traces.collect()))
            }
            None => DataReply::missing(),
        })
    }

    /// Plots to create and refetch for an events dashboard.
    pub fn poll_events(&self, request: &EventsPollRequest) -> Result<EventsPollResponse> {
        let state = self.lock()?;
        let fresh = request.session_id.is_empty() || request.session_id != state.session_id;
        let (update_type, states, mut active) = if fresh {
            debug!("creating new session {}", state.session_id);
            (UpdateType::New, BTreeMap::new(), BTreeMap::new())
        } else {
            (
                UpdateType::Update,
                request.states.clone(),
                request.active.clone(),
            )
        };

        let mut new_plots = Vec::new();
        for id in state.events.keys().filter(|id| !states.contains_key(*id)) {
            let group_id = random_token(self.config().token_len);
            new_plots.push(NewEventPlot {
                action: PlotAction::New,
                group_id: group_id.clone(),
                name: id.clone(),
                graph_id: id.clone(),
            });
            active.insert(group_id, vec![id.clone()]);
        }

        let mut updates: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (group_id, graphs) in &active {
            for graph in graphs {
                let Some(timeline) = state.events.get(graph) else {
                    debug!("unknown graph {graph} in group {group_id}");
                    continue;
                };
                let known = states.get(graph).map(String::as_str).unwrap_or("");
                if timeline.state_hash() != known {
                    updates.entry(group_id.clone()).or_default().push(graph.clone());
                }
            }
        }

        Ok(EventsPollResponse {
            update_type,
            session_id: state.session_id.clone(),
            new_plots,
            updates,
        })
    }

    /// Plots to create and refetch for a tensor dashboard.
    pub fn poll_tensors(&self, request: &TensorsPollRequest) -> Result<TensorsPollResponse> {
        let state = self.lock()?;
        let fresh = request.session_id.is_empty() || request.session_id != state.session_id;
        let (update_type, states, mut active) = if fresh {
            debug!("creating new session {}", state.session_id);
            (UpdateType::New, BTreeMap::new(), BTreeMap::new())
        } else {
            (
                UpdateType::Update,
                request.states.clone(),
                request.active.clone(),
            )
        };

        let mut new_plots = Vec::new();
        for id in state.tensors.keys().filter(|id| !states.contains_key(*id)) {
            let graph_div = random_token(self.config().token_len);
            new_plots.push(NewTensorPlot {
                action: PlotAction::New,
                graph_div: graph_div.clone(),
                graph_id: id.clone(),
            });
            active.insert(graph_div, id.clone());
        }

        let mut updates = Vec::new();
        for (graph_div, graph) in &active {
            let Some(timeline) = state.tensors.get(graph) else {
                debug!("unknown graph {graph} in div {graph_div}");
                continue;
            };
            let known = states.get(graph).map(String::as_str).unwrap_or("");
            if timeline.state_hash() != known {
                updates.push(graph_div.clone());
            }
        }

        Ok(TensorsPollResponse {
            update_type,
            session_id: state.session_id.clone(),
            new_plots,
            updates,
        })
    }
}
