use crate::errors::{DgpError, Result};
use crate::gp_node::GpNode;
use crate::likelihoods::LikelihoodNode;

use log::debug;
use ndarray::{Array2, ArrayBase, ArrayView2, Axis, Data, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// A node of a deep gaussian process network
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Node {
    /// Gaussian process node
    Gp(GpNode),
    /// Likelihood node, only allowed in the last layer
    Likelihood(LikelihoodNode),
}

impl Node {
    /// Columns of the previous layer output (or of the global input in the first layer)
    pub fn input_dim(&self) -> &[usize] {
        match self {
            Node::Gp(gp) => gp.input_dim(),
            Node::Likelihood(lik) => lik.input_dim(),
        }
    }

    /// Columns of the global input the node is connected to
    pub fn connect(&self) -> Option<&[usize]> {
        match self {
            Node::Gp(gp) => gp.connect(),
            Node::Likelihood(_) => None,
        }
    }

    /// The GP node if any
    pub fn as_gp(&self) -> Option<&GpNode> {
        match self {
            Node::Gp(gp) => Some(gp),
            Node::Likelihood(_) => None,
        }
    }

    /// The GP node if any, mutable access for imputation
    pub fn as_gp_mut(&mut self) -> Option<&mut GpNode> {
        match self {
            Node::Gp(gp) => Some(gp),
            Node::Likelihood(_) => None,
        }
    }

    /// The likelihood node if any
    pub fn as_likelihood(&self) -> Option<&LikelihoodNode> {
        match self {
            Node::Gp(_) => None,
            Node::Likelihood(lik) => Some(lik),
        }
    }
}

impl From<GpNode> for Node {
    fn from(gp: GpNode) -> Node {
        Node::Gp(gp)
    }
}

impl From<LikelihoodNode> for Node {
    fn from(lik: LikelihoodNode) -> Node {
        Node::Likelihood(lik)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Node::Gp(gp) => write!(f, "{}", gp),
            Node::Likelihood(lik) => write!(f, "{}", lik),
        }
    }
}

/// An ordered set of nodes, columns of a layer output follow node order
pub type Layer = Vec<Node>;

/// Predictive means and variances of a layer, (n_points, n_nodes) arrays
#[derive(Clone, Debug, PartialEq)]
pub struct LayerMoments {
    /// Predictive means
    pub mean: Array2<f64>,
    /// Predictive variances
    pub var: Array2<f64>,
}

/// A trained deep gaussian process, ordered sequence of layers.
///
/// The first layer consumes the global input, subsequent layers consume the uncertain
/// output of their previous layer, GP nodes being optionally connected to the global input.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Network {
    layers: Vec<Layer>,
}

impl Network {
    /// Build a network checking its structure
    pub fn new(layers: Vec<Layer>) -> Result<Network> {
        if layers.is_empty() {
            return Err(DgpError::InvalidValueError(
                "Network should have at least one layer".to_string(),
            ));
        }
        let n_layers = layers.len();
        for (l, layer) in layers.iter().enumerate() {
            if layer.is_empty() {
                return Err(DgpError::InvalidValueError(format!("Layer {} is empty", l)));
            }
            for node in layer {
                match node {
                    Node::Likelihood(_) if l == 0 => {
                        return Err(DgpError::InvalidValueError(
                            "Likelihood node not allowed in the first layer".to_string(),
                        ))
                    }
                    Node::Likelihood(_) if l != n_layers - 1 => {
                        return Err(DgpError::InvalidValueError(format!(
                            "Likelihood node not allowed in hidden layer {}",
                            l
                        )))
                    }
                    Node::Gp(gp) if l == 0 && gp.connect().is_some() => {
                        return Err(DgpError::InvalidValueError(
                            "First layer nodes cannot be connected to the global input"
                                .to_string(),
                        ))
                    }
                    _ => (),
                }
                if l > 0 {
                    let width = layers[l - 1].len();
                    if let Some(i) = node.input_dim().iter().find(|&&i| i >= width) {
                        return Err(DgpError::InvalidValueError(format!(
                            "Node input {} out of layer {} output range ({} nodes)",
                            i,
                            l - 1,
                            width
                        )));
                    }
                }
            }
        }
        Ok(Network { layers })
    }

    /// Layers of the network
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Mutable access to layers used by imputation to update latent data of nodes.
    /// The network structure can not be changed.
    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    /// Number of layers
    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    /// Output layer
    pub fn output_layer(&self) -> &Layer {
        &self.layers[self.layers.len() - 1]
    }

    /// Propagate predictive moments of test points `x` (n, nx) through the network.
    ///
    /// Returns moments of every layer when `full_layer` is true, otherwise only output
    /// layer moments.
    pub fn propagate(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        full_layer: bool,
    ) -> Result<Vec<LayerMoments>> {
        let mut moments = self.propagate_layers(x, self.n_layers())?;
        if !full_layer {
            moments.drain(..moments.len() - 1);
        }
        Ok(moments)
    }

    /// Propagate predictive moments through the first `n_layers` layers
    pub(crate) fn propagate_layers(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        n_layers: usize,
    ) -> Result<Vec<LayerMoments>> {
        let x = x.view();
        let mut moments: Vec<LayerMoments> = Vec::with_capacity(n_layers);
        for (l, layer) in self.layers.iter().take(n_layers).enumerate() {
            let layer_moments = match moments.last() {
                None => first_layer_prediction(layer, &x)?,
                Some(prev) => linked_layer_prediction(layer, prev, &x)?,
            };
            debug!(
                "Layer {} propagated: mean {:?}, var {:?}",
                l,
                layer_moments.mean.dim(),
                layer_moments.var.dim()
            );
            moments.push(layer_moments);
        }
        Ok(moments)
    }
}

/// Select columns of `x` checking they are in range
pub(crate) fn select_columns(x: &ArrayView2<f64>, indices: &[usize]) -> Result<Array2<f64>> {
    if let Some(i) = indices.iter().find(|&&i| i >= x.ncols()) {
        return Err(DgpError::InvalidValueError(format!(
            "Column {} out of input range ({} columns)",
            i,
            x.ncols()
        )));
    }
    Ok(x.select(Axis(1), indices))
}

fn first_layer_prediction(layer: &Layer, x: &ArrayView2<f64>) -> Result<LayerMoments> {
    let mut mean = Array2::zeros((x.nrows(), layer.len()));
    let mut var = Array2::zeros((x.nrows(), layer.len()));
    for (j, node) in layer.iter().enumerate() {
        let gp = node.as_gp().ok_or_else(|| {
            DgpError::InvalidValueError("First layer nodes should be GP nodes".to_string())
        })?;
        let xs = select_columns(x, gp.input_dim())?;
        let (mu, sigma2) = gp.gp_prediction(&xs, None::<&Array2<f64>>)?;
        mean.column_mut(j).assign(&mu);
        var.column_mut(j).assign(&sigma2);
    }
    Ok(LayerMoments { mean, var })
}

fn linked_layer_prediction(
    layer: &Layer,
    prev: &LayerMoments,
    x: &ArrayView2<f64>,
) -> Result<LayerMoments> {
    let mut mean = Array2::zeros((x.nrows(), layer.len()));
    let mut var = Array2::zeros((x.nrows(), layer.len()));
    for (j, node) in layer.iter().enumerate() {
        let m = select_columns(&prev.mean.view(), node.input_dim())?;
        let v = select_columns(&prev.var.view(), node.input_dim())?;
        let (mu, sigma2) = match node {
            Node::Gp(gp) => {
                let z = gp
                    .connect()
                    .map(|connect| select_columns(x, connect))
                    .transpose()?;
                gp.linkgp_prediction(&m, &v, z.as_ref())?
            }
            Node::Likelihood(lik) => lik.prediction(&m, &v)?,
        };
        mean.column_mut(j).assign(&mu);
        var.column_mut(j).assign(&sigma2);
    }
    Ok(LayerMoments { mean, var })
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (l, layer) in self.layers.iter().enumerate() {
            write!(f, "Layer {}: [", l)?;
            for (j, node) in layer.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", node)?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}
