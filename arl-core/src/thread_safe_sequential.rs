use candle_core::{Error, Result, Tensor};
use candle_nn::{
    Activation, Conv2d, Conv2dConfig, Init, Linear, Module, VarBuilder, init::DEFAULT_KAIMING_NORMAL,
};

// Kaiming normal weights and zero biases for every parameterised layer.
pub fn linear_layer(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Linear> {
    let weight = vb.get_with_hints((out_dim, in_dim), "weight", DEFAULT_KAIMING_NORMAL)?;
    let bias = vb.get_with_hints(out_dim, "bias", Init::Const(0.))?;
    Ok(Linear::new(weight, Some(bias)))
}

pub fn conv2d_layer(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    vb: VarBuilder,
) -> Result<Conv2d> {
    let weight = vb.get_with_hints(
        (out_channels, in_channels, kernel_size, kernel_size),
        "weight",
        DEFAULT_KAIMING_NORMAL,
    )?;
    let bias = vb.get_with_hints(out_channels, "bias", Init::Const(0.))?;
    let config = Conv2dConfig {
        stride,
        ..Default::default()
    };
    Ok(Conv2d::new(weight, Some(bias), config))
}

/// Output (height, width) of a conv layer without padding or dilation. Fails when the input is
/// smaller than the kernel.
pub fn calc_conv2d_output(
    h_w: (usize, usize),
    kernel_size: usize,
    stride: usize,
) -> Result<(usize, usize)> {
    let (h, w) = h_w;
    let out = |size: usize| {
        size.checked_sub(kernel_size)
            .map(|rest| rest / stride + 1)
            .ok_or_else(|| {
                Error::Msg(format!(
                    "a {kernel_size}x{kernel_size} kernel does not fit a {h}x{w} input"
                ))
            })
    };
    Ok((out(h)?, out(w)?))
}

#[derive(Debug, Clone)]
pub enum ThreadSafeLayer {
    Linear(Linear),
    Conv2d(Conv2d),
    Activation(Activation),
    Flatten,
    Scale(f64),
}

impl Module for ThreadSafeLayer {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        match self {
            Self::Linear(linear) => linear.forward(xs),
            Self::Conv2d(conv) => conv.forward(xs),
            Self::Activation(activation) => activation.forward(xs),
            Self::Flatten => xs.flatten_from(1),
            Self::Scale(scale) => xs.affine(*scale, 0.),
        }
    }
}

// Only holds tensors and plain enums, so it is Send + Sync and can be handed to actor threads.
#[derive(Default, Debug, Clone)]
pub struct ThreadSafeSequential {
    layers: Vec<ThreadSafeLayer>,
}

impl ThreadSafeSequential {
    pub fn add(mut self, layer: ThreadSafeLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Module for ThreadSafeSequential {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.clone();
        for layer in self.layers.iter() {
            xs = layer.forward(&xs)?
        }
        Ok(xs)
    }
}

pub fn build_sequential(
    input_dim: usize,
    layers: &[usize],
    vb: &VarBuilder,
    prefix: &str,
) -> Result<ThreadSafeSequential> {
    extend_sequential(ThreadSafeSequential::default(), input_dim, layers, vb, prefix)
}

fn extend_sequential(
    mut nn: ThreadSafeSequential,
    input_dim: usize,
    layers: &[usize],
    vb: &VarBuilder,
    prefix: &str,
) -> Result<ThreadSafeSequential> {
    let mut last_dim = input_dim;
    let num_layers = layers.len();
    for (layer_idx, layer_size) in layers.iter().enumerate() {
        let layer_pp = format!("{prefix}{layer_idx}");
        let layer = linear_layer(last_dim, *layer_size, vb.pp(layer_pp))?;
        nn = nn.add(ThreadSafeLayer::Linear(layer));
        if layer_idx != num_layers - 1 {
            nn = nn.add(ThreadSafeLayer::Activation(Activation::Relu));
        }
        last_dim = *layer_size;
    }
    Ok(nn)
}

/// The Atari body: three conv layers and a 512 unit dense layer. Pixel input is scaled to [0, 1].
/// `head` is appended after the body, e.g. `[n_actions]` or `[1]`.
pub fn build_conv_net(
    observation_shape: &[usize],
    head: &[usize],
    vb: &VarBuilder,
    prefix: &str,
) -> Result<ThreadSafeSequential> {
    build_conv_net_on_trunk(observation_shape, head, vb, prefix, &format!("{prefix}head"))
}

/// Like [`build_conv_net`] with separate names for the body and the head. A varmap hands out the
/// same variable for the same name, so nets built from one varmap with the same `trunk_prefix`
/// train a single body.
pub fn build_conv_net_on_trunk(
    observation_shape: &[usize],
    head: &[usize],
    vb: &VarBuilder,
    trunk_prefix: &str,
    head_prefix: &str,
) -> Result<ThreadSafeSequential> {
    conv_net(observation_shape, head, vb, trunk_prefix, head_prefix, 1. / 255.)
}

/// The conv net for inputs that are already normalised, e.g. by a running mean and std. The input
/// is multiplied by `input_scale` instead of `1 / 255`.
pub fn build_conv_net_with_scale(
    observation_shape: &[usize],
    head: &[usize],
    vb: &VarBuilder,
    prefix: &str,
    input_scale: f64,
) -> Result<ThreadSafeSequential> {
    conv_net(observation_shape, head, vb, prefix, &format!("{prefix}head"), input_scale)
}

fn conv_net(
    observation_shape: &[usize],
    head: &[usize],
    vb: &VarBuilder,
    trunk_prefix: &str,
    head_prefix: &str,
    input_scale: f64,
) -> Result<ThreadSafeSequential> {
    let [c, h, w] = observation_shape else {
        return Err(Error::Msg(format!(
            "conv net expects [C, H, W] observations, got {observation_shape:?}"
        )));
    };
    let (h, w) = calc_conv2d_output((*h, *w), 8, 4)?;
    let (h, w) = calc_conv2d_output((h, w), 4, 2)?;
    let (h, w) = calc_conv2d_output((h, w), 3, 1)?;
    let prefix = trunk_prefix;
    let conv2d_out_size = 64 * h * w;
    let relu = || ThreadSafeLayer::Activation(Activation::Relu);
    let mut nn = ThreadSafeSequential::default();
    if input_scale != 1. {
        nn = nn.add(ThreadSafeLayer::Scale(input_scale));
    }
    let nn = nn
        .add(ThreadSafeLayer::Conv2d(conv2d_layer(
            *c,
            32,
            8,
            4,
            vb.pp(format!("{prefix}conv0")),
        )?))
        .add(relu())
        .add(ThreadSafeLayer::Conv2d(conv2d_layer(
            32,
            64,
            4,
            2,
            vb.pp(format!("{prefix}conv1")),
        )?))
        .add(relu())
        .add(ThreadSafeLayer::Conv2d(conv2d_layer(
            64,
            64,
            3,
            1,
            vb.pp(format!("{prefix}conv2")),
        )?))
        .add(relu())
        .add(ThreadSafeLayer::Flatten)
        .add(ThreadSafeLayer::Linear(linear_layer(
            conv2d_out_size,
            512,
            vb.pp(format!("{prefix}fc")),
        )?))
        .add(relu());
    extend_sequential(nn, 512, head, vb, head_prefix)
}
