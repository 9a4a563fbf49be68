use burn::{
    backend::{Autodiff, NdArray},
    module::{ModuleVisitor, ParamId},
    prelude::*,
    tensor::Distribution,
};
use serde_json::json;

use crate::{
    config::{Activation, DecoderBlockType, EncoderFeatures, LayerRef, UnetConfig},
    error::UnetError,
    BackboneEncoder, BackboneKind, Unet,
};

type TestBackend = NdArray<f32>;
type TestAutodiffBackend = Autodiff<NdArray<f32>>;

fn random_input(shape: [usize; 4]) -> Tensor<TestBackend, 4> {
    Tensor::random(shape, Distribution::Normal(0.0, 1.0), &Default::default())
}

/// Counts float tensors of a module and how many of them require gradients.
#[derive(Default)]
struct GradCounter {
    total: usize,
    trainable: usize,
}

impl<B: Backend> ModuleVisitor<B> for GradCounter {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.total += 1;
        if tensor.is_require_grad() {
            self.trainable += 1;
        }
    }
}

fn grad_counts<M: Module<TestAutodiffBackend>>(module: &M) -> GradCounter {
    let mut counter = GradCounter::default();
    module.visit(&mut counter);
    counter
}

fn build(config: &UnetConfig) -> Result<Unet<TestBackend>, UnetError> {
    config.init::<TestBackend>(&Default::default())
}

#[test]
fn test_default_vgg16_unet() {
    let model = build(&UnetConfig::new()).unwrap();

    assert_eq!(model.name(), "u-vgg16");
    assert_eq!(model.num_decoder_blocks(), 5);
    assert_eq!(model.skip_indices().len(), 5);

    let output = model.forward(random_input([1, 3, 64, 64])).unwrap();
    assert_eq!(output.dims(), [1, 1, 64, 64]);

    let min = output.clone().min().into_scalar();
    let max = output.max().into_scalar();
    assert!(min >= 0.0 && max <= 1.0);
}

#[test]
fn test_resnet18_softmax_sums_to_one_over_classes() {
    let config = UnetConfig::new()
        .with_backbone_name("resnet18".to_string())
        .with_classes(3)
        .with_activation(Activation::Softmax);
    let model = build(&config).unwrap();

    assert_eq!(model.name(), "u-resnet18");
    assert_eq!(model.skip_indices().len(), 4);

    let output = model.forward(random_input([2, 3, 32, 64])).unwrap();
    assert_eq!(output.dims(), [2, 3, 32, 64]);

    let sums = output.sum_dim(1);
    sums.into_data().assert_approx_eq::<f32>(
        &Tensor::<TestBackend, 4>::ones([2, 1, 32, 64], &Default::default()).into_data(),
        Default::default(),
    );
}

#[test]
fn test_transpose_decoder_matches_upsampling_geometry() {
    let base = UnetConfig::new()
        .with_backbone_name("resnet18".to_string())
        .with_classes(2);
    let upsampling = build(&base).unwrap();
    let transpose = build(
        &base
            .clone()
            .with_decoder_block_type(DecoderBlockType::Transpose),
    )
    .unwrap();

    let input = random_input([1, 3, 64, 64]);
    let expected = upsampling.forward(input.clone()).unwrap().dims();
    assert_eq!(transpose.forward(input).unwrap().dims(), expected);
}

#[test]
fn test_decoder_without_batchnorm() {
    let config = UnetConfig::new()
        .with_decoder_use_batchnorm(false)
        .with_activation(Activation::Linear);
    let with_bn = build(&UnetConfig::new()).unwrap();
    let without_bn = build(&config).unwrap();

    assert!(without_bn.num_params() < with_bn.num_params());
    let output = without_bn.forward(random_input([1, 3, 32, 32])).unwrap();
    assert_eq!(output.dims(), [1, 1, 32, 32]);
}

#[test]
fn test_shorter_decoder_stops_at_lower_resolution() {
    let config = UnetConfig::new()
        .with_backbone_name("resnet18".to_string())
        .with_decoder_filters(vec![64, 32, 16, 8]);
    let model = build(&config).unwrap();

    assert_eq!(model.output_reduction(), 2);
    let output = model.forward(random_input([1, 3, 64, 64])).unwrap();
    assert_eq!(output.dims(), [1, 1, 32, 32]);
}

#[test]
fn test_single_channel_input() {
    let config = UnetConfig::new()
        .with_backbone_name("resnet18".to_string())
        .with_input_channels(1)
        .with_input_size(Some([64, 64]));
    let model = build(&config).unwrap();

    let output = model.forward(random_input([1, 1, 64, 64])).unwrap();
    assert_eq!(output.dims(), [1, 1, 64, 64]);
}

#[test]
fn test_encoder_freeze() {
    let base = UnetConfig::new().with_backbone_name("resnet18".to_string());
    let frozen = base
        .clone()
        .with_encoder_freeze(true)
        .init::<TestAutodiffBackend>(&Default::default())
        .unwrap();
    let trainable = base
        .init::<TestAutodiffBackend>(&Default::default())
        .unwrap();

    let encoder = grad_counts(&frozen.encoder);
    assert!(encoder.total > 0);
    assert_eq!(encoder.trainable, 0);

    // BatchNorm running statistics never require gradients.
    let decoder = grad_counts(&frozen.blocks);
    assert!(decoder.trainable > 0);
    assert_eq!(decoder.trainable, grad_counts(&trainable.blocks).trainable);

    let head = grad_counts(&frozen.final_conv);
    assert_eq!(head.trainable, head.total);

    let BackboneEncoder::ResNet(resnet) = &frozen.encoder else {
        panic!("Expected a ResNet encoder");
    };
    assert!(!resnet.stem.conv0.weight.val().is_require_grad());
}

#[test]
fn test_encoder_trainable_by_default() {
    let config = UnetConfig::new().with_backbone_name("resnet18".to_string());
    let model = config
        .init::<TestAutodiffBackend>(&Default::default())
        .unwrap();

    let encoder = grad_counts(&model.encoder);
    assert!(encoder.trainable > 0);
    assert!(encoder.trainable < encoder.total);
}

#[test]
fn test_legacy_freeze_encoder_argument() {
    let config = UnetConfig::from_legacy_json(json!({
        "backbone_name": "resnet18",
        "freeze_encoder": true,
        "upsample_rates": [2, 2, 2, 2, 2],
    }))
    .unwrap();
    let model = config
        .init::<TestAutodiffBackend>(&Default::default())
        .unwrap();

    let BackboneEncoder::ResNet(encoder) = &model.encoder else {
        panic!("Expected a ResNet encoder");
    };
    assert!(!encoder.stem.conv0.weight.val().is_require_grad());
    assert_eq!(model.name(), "u-resnet18");
}

#[test]
fn test_explicit_encoder_features() {
    let features = EncoderFeatures::Layers(vec![
        LayerRef::from("block5_conv3"),
        LayerRef::Index(13),
        LayerRef::from("block3_conv3"),
    ]);
    let config = UnetConfig::new().with_encoder_features(features);
    let model = build(&config).unwrap();

    assert_eq!(model.skip_indices(), &[17, 13, 9]);
    let output = model.forward(random_input([1, 3, 32, 32])).unwrap();
    assert_eq!(output.dims(), [1, 1, 32, 32]);
}

#[test]
fn test_unknown_skip_layer() {
    let config = UnetConfig::new()
        .with_encoder_features(EncoderFeatures::Layers(vec![LayerRef::from("block6_conv1")]));

    match build(&config) {
        Err(UnetError::LayerNotFound { layer }) => assert_eq!(layer, "block6_conv1"),
        other => panic!("Expected LayerNotFound error, got {:?}", other.err()),
    }
}

#[test]
fn test_skip_index_out_of_range() {
    let config = UnetConfig::new()
        .with_backbone_name("resnet18".to_string())
        .with_encoder_features(EncoderFeatures::Layers(vec![LayerRef::Index(10_000)]));

    assert!(matches!(
        build(&config),
        Err(UnetError::LayerIndexOutOfRange { index: 10_000, .. })
    ));
}

#[test]
fn test_too_many_decoder_filters() {
    let config = UnetConfig::new().with_decoder_filters(vec![256, 128, 64, 32, 16, 8]);

    match build(&config) {
        Err(UnetError::InvalidConfiguration { reason }) => {
            assert!(reason.contains("at most 5 decoder blocks"));
        }
        other => panic!("Expected InvalidConfiguration error, got {:?}", other.err()),
    }
}

#[test]
fn test_more_default_skips_than_decoder_blocks() {
    let config = UnetConfig::new().with_decoder_filters(vec![256, 128, 64]);
    assert!(matches!(
        build(&config),
        Err(UnetError::InvalidConfiguration { .. })
    ));
}

#[test]
fn test_unknown_backbone() {
    let config = UnetConfig::new().with_backbone_name("efficientnetb0".to_string());

    match build(&config) {
        Err(UnetError::UnknownBackbone { backbone }) => assert_eq!(backbone, "efficientnetb0"),
        other => panic!("Expected UnknownBackbone error, got {:?}", other.err()),
    }
}

#[test]
fn test_listed_backbone_without_encoder() {
    let config = UnetConfig::new().with_backbone_name("densenet121".to_string());
    assert!(matches!(
        build(&config),
        Err(UnetError::UnsupportedBackbone { .. })
    ));
}

#[test]
fn test_input_size_not_divisible_by_stride() {
    let config = UnetConfig::new().with_input_size(Some([100, 64]));
    assert!(matches!(
        build(&config),
        Err(UnetError::InvalidConfiguration { .. })
    ));
}

#[test]
fn test_forward_rejects_non_divisible_input() {
    let model = build(&UnetConfig::new()).unwrap();

    match model.forward(random_input([1, 3, 48, 64])) {
        Err(UnetError::InvalidTensorShape { actual, .. }) => {
            assert_eq!(actual, "[1, 3, 48, 64]");
        }
        other => panic!("Expected InvalidTensorShape error, got {:?}", other.err()),
    }
}

#[test]
fn test_forward_rejects_wrong_channel_count() {
    let model = build(&UnetConfig::new()).unwrap();
    assert!(matches!(
        model.forward(random_input([1, 1, 32, 32])),
        Err(UnetError::InvalidTensorShape { .. })
    ));
}

#[test]
fn test_pretrained_weights_need_three_channels() {
    let config = UnetConfig::new()
        .with_input_channels(1)
        .with_encoder_weights(crate::config::EncoderWeights::Imagenet);

    match build(&config) {
        Err(UnetError::InvalidConfiguration { reason }) => {
            assert!(reason.contains("3 input channels"));
        }
        other => panic!("Expected InvalidConfiguration error, got {:?}", other.err()),
    }
}

#[test]
fn test_default_skip_table_matches_shipped_encoders() {
    for kind in [
        BackboneKind::Vgg16,
        BackboneKind::Vgg19,
        BackboneKind::ResNet18,
        BackboneKind::ResNet34,
        BackboneKind::ResNet50,
        BackboneKind::ResNeXt50,
    ] {
        let config = UnetConfig::new().with_backbone_name(kind.to_string());
        let model = build(&config).unwrap_or_else(|e| panic!("{kind}: {e}"));

        let expected = crate::default_skip_connections(kind.as_str()).unwrap().len();
        assert_eq!(model.skip_indices().len(), expected, "{kind}");
        assert_eq!(model.name(), format!("u-{kind}"));
    }
}

#[test]
fn test_config_round_trips_through_json() {
    let config = UnetConfig::new()
        .with_backbone_name("resnet50".to_string())
        .with_classes(4)
        .with_encoder_features(EncoderFeatures::Layers(vec![
            LayerRef::from("stage4_unit1_relu1"),
            LayerRef::Index(4),
        ]));

    let json = serde_json::to_string(&config).unwrap();
    let restored: UnetConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.to_string(), config.to_string());
}
