use oplower::ops::lstm::{Lstm, LstmAttributes, LstmInputs, LstmOutputs};
use oplower::{lower, InMemoryRegistry, LowerError, Operator, OperatorKind, TensorData, TensorRegistry};
use oplower::types::{ElementType, TensorRole};

const SEQ: usize = 3;
const HIDDEN: usize = 4;
const INPUT: usize = 2;

/// Registry holding `X`, `W` and `R` for a time-major unit.
fn registry(num_directions: usize, batch: usize) -> InMemoryRegistry {
    let mut reg = InMemoryRegistry::new();
    reg.add_input("X", ElementType::F32, vec![SEQ, batch, INPUT]);
    let w_len = num_directions * 4 * HIDDEN * INPUT;
    let r_len = num_directions * 4 * HIDDEN * HIDDEN;
    reg.add_initializer(
        "W",
        vec![num_directions, 4 * HIDDEN, INPUT],
        TensorData::F32(vec![0.1; w_len]),
    );
    reg.add_initializer(
        "R",
        vec![num_directions, 4 * HIDDEN, HIDDEN],
        TensorData::F32(vec![0.2; r_len]),
    );
    reg
}

fn generate(
    attrs: LstmAttributes,
    inputs: LstmInputs,
    outputs: LstmOutputs,
    reg: &mut InMemoryRegistry,
) -> String {
    let mut op = Lstm::new(attrs, inputs, outputs);
    lower(&mut op, reg, "l").expect("lowering should succeed")
}

fn basic_inputs() -> LstmInputs {
    LstmInputs::new("X", "W", "R")
}

#[test]
fn forward_weight_slices_and_buffer_sizes() {
    let mut reg = registry(1, 1);
    let text = generate(
        LstmAttributes::new(HIDDEN),
        basic_inputs(),
        LstmOutputs::new("Y", "Y_h", ""),
        &mut reg,
    );

    assert!(text.contains("\tfloat op_l_ff_input_gate[12];\n"));
    assert!(text.contains("\tfloat op_l_ff_forget_gate[12];\n"));
    assert!(text.contains("\tfloat op_l_output_gate[12];\n"));
    assert!(text.contains("\tfloat *op_l_input = tensor_X;\n"));
    assert!(text.contains("\tfloat *op_l_hidden_state = tensor_Y;\n"));
    assert!(text.contains(
        "BLAS::sgemm_(&op_l_transB, &op_l_transA, &op_l_n, &op_l_m, &op_l_k, &op_l_alpha, \
         tensor_W, &op_l_k, op_l_input, &op_l_k, &op_l_beta, op_l_ff_input_gate, &op_l_n);"
    ));
    assert!(text.contains("tensor_W + 8, &op_l_k, op_l_input, &op_l_k, &op_l_beta, op_l_ff_forget_gate, &op_l_n);"));
    assert!(text.contains("tensor_W + 16, &op_l_k, op_l_input, &op_l_k, &op_l_beta, op_l_ff_output_gate, &op_l_n);"));
    assert!(text.contains("tensor_W + 24, &op_l_k, op_l_input, &op_l_k, &op_l_beta, op_l_ff_cell_gate, &op_l_n);"));
    assert!(text.contains("\tint op_l_m = 3;\n"));
    assert!(text.contains("\tint op_l_k = 2;\n"));
    assert!(!text.contains("bias_size"));

    assert_eq!(reg.shape_of("Y"), Some(&[3, 1, 1, 4][..]));
    assert_eq!(reg.shape_of("Y_h"), Some(&[1, 1, 4][..]));
    assert_eq!(reg.descriptor("Y").map(|d| d.role), Some(TensorRole::Intermediate));
    assert!(!reg.exists("Y_c"));
}

#[test]
fn forward_recurrence_without_initial_state() {
    let mut reg = registry(1, 1);
    let text = generate(
        LstmAttributes::new(HIDDEN),
        basic_inputs(),
        LstmOutputs::new("Y", "Y_h", "Y_c"),
        &mut reg,
    );

    assert!(text.contains("size_t index = seq;"));
    assert!(text.contains("size_t offset = index * 4;"));
    assert!(!text.contains("seq == 0"));
    assert!(text.contains("if (seq > 0) {"));
    assert!(text.contains("size_t previous_offset = (seq - 1) * 4;"));
    assert!(text.contains(
        "BLAS::sgemm_(&op_l_transB, &op_l_transA, &op_l_n, &m2, &op_l_n, &op_l_alpha, tensor_R + 32, \
         &op_l_n, op_l_hidden_state + previous_offset, &op_l_n, &op_l_alpha, op_l_output_gate + offset, &op_l_n);"
    ));
    assert!(text.contains("op_l_cell_state[i + offset] += op_l_forget_gate[i + offset] * op_l_cell_state[i + previous_offset];"));
    assert!(text.contains("op_l_hidden_state[i] = op_l_output_gate[i] * op_l_new_cell_state[i];"));
    assert!(text.contains("std::copy(op_l_hidden_state + 8, op_l_hidden_state + 8 + 4, tensor_Y_h);"));
    assert!(text.contains("std::copy(op_l_cell_state + 8, op_l_cell_state + 8 + 4, tensor_Y_c);"));
}

#[test]
fn default_activations_are_sigmoid_tanh_tanh() {
    let mut reg = registry(1, 1);
    let text = generate(
        LstmAttributes::new(HIDDEN),
        basic_inputs(),
        LstmOutputs::new("Y", "", ""),
        &mut reg,
    );
    assert!(text.contains("op_l_input_gate[i] = 1. / (1. + exp(-op_l_input_gate[i]));"));
    assert!(text.contains("op_l_forget_gate[i] = 1. / (1. + exp(-op_l_forget_gate[i]));"));
    assert!(text.contains("op_l_output_gate[i] = 1. / (1. + exp(-op_l_output_gate[i]));"));
    assert!(text.contains("float ex = exp(-2 * op_l_cell_gate[i]);"));
    assert!(text.contains("float ex = exp(-2 * op_l_new_cell_state[i]);"));
}

#[test]
fn bidirectional_second_direction_offsets() {
    let mut reg = registry(2, 1);
    let text = generate(
        LstmAttributes::new(HIDDEN).with_direction("bidirectional"),
        basic_inputs(),
        LstmOutputs::new("Y", "Y_h", ""),
        &mut reg,
    );

    // input gate of direction 1 starts after four gate blocks
    assert!(text.contains("tensor_W + 32, &op_l_k, op_l_input, &op_l_k, &op_l_beta, op_l_ff_input_gate, &op_l_n);"));
    assert!(text.contains("tensor_W + 40, &op_l_k, op_l_input, &op_l_k, &op_l_beta, op_l_ff_forget_gate, &op_l_n);"));
    assert!(text.contains("tensor_R + 80, &op_l_n, op_l_hidden_state + previous_offset"));
    assert!(text.contains("\tfloat op_l_input_gate[24];\n"));
    assert!(text.contains("\tfloat op_l_ff_input_gate[12];\n"));
    assert!(text.contains("size_t gate_offset = seq * 8 + 4;"));
    assert!(text.contains("size_t index = 2 - seq;"));
    assert!(text.contains("size_t offset = index * 8 + 4;"));
    assert!(text.contains("size_t previous_offset = (index + 1) * 8 + 4;"));
    assert!(text.contains("std::copy(op_l_hidden_state + 16, op_l_hidden_state + 16 + 4, tensor_Y_h);"));
    assert!(text.contains("std::copy(op_l_hidden_state + 4, op_l_hidden_state + 4 + 4, tensor_Y_h + 4);"));
    assert_eq!(reg.shape_of("Y"), Some(&[3, 2, 1, 4][..]));
}

#[test]
fn backward_walks_from_last_step() {
    let mut reg = registry(1, 1);
    let text = generate(
        LstmAttributes::new(HIDDEN).with_direction("backward"),
        basic_inputs(),
        LstmOutputs::new("", "Y_h", ""),
        &mut reg,
    );
    assert!(text.contains("size_t index = 2 - seq;"));
    assert!(text.contains("size_t previous_offset = (index + 1) * 4;"));
    assert!(text.contains("\tfloat op_l_hidden_state[12];\n"));
    assert!(text.contains("std::copy(op_l_hidden_state, op_l_hidden_state + 4, tensor_Y_h);"));
}

#[test]
fn coupled_input_forget_omits_forget_gate() {
    let mut reg = registry(1, 1);
    reg.add_initializer("B", vec![1, 32], TensorData::F32(vec![0.5; 32]));
    let text = generate(
        LstmAttributes::new(HIDDEN).with_input_forget(1),
        basic_inputs().with_bias("B"),
        LstmOutputs::new("Y", "", ""),
        &mut reg,
    );
    assert!(!text.contains("forget"));
    assert!(!text.contains("op_l_cell_state[i + offset] +="));
    assert!(text.contains("op_l_cell_state[i] = op_l_input_gate[i] * op_l_cell_gate[i];"));
    assert_eq!(text.matches("BLAS::saxpy_").count(), 3);
}

#[test]
fn bias_is_canonicalized_and_sliced_per_gate() {
    let mut reg = registry(1, 1);
    let original: Vec<f32> = (0..32).map(|v| v as f32).collect();
    reg.add_initializer("B", vec![1, 32], TensorData::F32(original.clone()));
    let text = generate(
        LstmAttributes::new(HIDDEN),
        basic_inputs().with_bias("B"),
        LstmOutputs::new("Y", "", ""),
        &mut reg,
    );

    assert_eq!(reg.shape_of("B"), Some(&[4, 1, 3, 1, 4][..]));
    let expanded = reg
        .initializer_data("B")
        .and_then(TensorData::as_f32)
        .expect("bias stays f32")
        .to_vec();
    for gate in 0..4 {
        for seq in 0..SEQ {
            for h in 0..HIDDEN {
                let want = original[gate * HIDDEN + h] + original[(gate + 4) * HIDDEN + h];
                assert_eq!(expanded[gate * 12 + seq * HIDDEN + h], want);
            }
        }
    }

    assert!(text.contains("\tint op_l_bias_size = 12;\n"));
    assert!(text.contains(
        "BLAS::saxpy_(&op_l_bias_size, &op_l_alpha, tensor_B, &op_l_incx, op_l_ff_input_gate, &op_l_incy);"
    ));
    assert!(text.contains("tensor_B + 12, &op_l_incx, op_l_ff_forget_gate, &op_l_incy);"));
    assert!(text.contains("tensor_B + 24, &op_l_incx, op_l_ff_output_gate, &op_l_incy);"));
    assert!(text.contains("tensor_B + 36, &op_l_incx, op_l_ff_cell_gate, &op_l_incy);"));
}

#[test]
fn canonical_bias_passes_through() {
    let mut reg = registry(1, 1);
    let canonical = vec![1.5_f32; 4 * 3 * 4];
    reg.add_initializer("B", vec![4, 1, 3, 1, 4], TensorData::F32(canonical.clone()));
    generate(
        LstmAttributes::new(HIDDEN),
        basic_inputs().with_bias("B"),
        LstmOutputs::new("Y", "", ""),
        &mut reg,
    );
    assert_eq!(
        reg.initializer_data("B").and_then(TensorData::as_f32),
        Some(canonical.as_slice())
    );
}

#[test]
fn peepholes_feed_gates_around_cell_update() {
    let mut reg = registry(1, 2);
    let p: Vec<f32> = (0..12).map(|v| v as f32).collect();
    reg.add_initializer("P", vec![1, 12], TensorData::F32(p.clone()));
    reg.add_input("c0", ElementType::F32, vec![1, 2, HIDDEN]);
    let text = generate(
        LstmAttributes::new(HIDDEN),
        basic_inputs().with_peephole("P").with_initial_c("c0"),
        LstmOutputs::new("Y", "", ""),
        &mut reg,
    );

    assert_eq!(reg.shape_of("P"), Some(&[1, 3, 2, 4][..]));
    let expanded = reg.initializer_data("P").and_then(TensorData::as_f32).unwrap();
    for gate in 0..3 {
        for batch in 0..2 {
            let at = gate * 8 + batch * 4;
            assert_eq!(&expanded[at..at + 4], &p[gate * 4..gate * 4 + 4]);
        }
    }

    assert!(text.contains("op_l_input_gate[i + offset] += tensor_P[i] * op_l_initial_cell_state[i];"));
    assert!(text.contains("op_l_forget_gate[i + offset] += tensor_P[i + 8] * op_l_initial_cell_state[i];"));
    assert!(text.contains("size_t c_offset = (seq - 1) * 8;"));
    assert!(text.contains("op_l_input_gate[i + offset] += tensor_P[i] * op_l_cell_state[i + c_offset];"));
    assert!(text.contains("op_l_cell_state[i + offset] += op_l_forget_gate[i + offset] * op_l_initial_cell_state[i];"));

    let output_peephole = "op_l_output_gate[i + offset] += tensor_P[i + 16] * op_l_cell_state[i + offset];";
    let cell_update = "op_l_cell_state[i] = op_l_input_gate[i] * op_l_cell_gate[i];";
    let output_activation = "op_l_output_gate[i] = 1. / (1. + exp(-op_l_output_gate[i]));";
    let peephole_at = text.find(output_peephole).expect("output peephole emitted");
    assert!(text.find(cell_update).unwrap() < peephole_at);
    assert!(peephole_at < text.find(output_activation).unwrap());
}

#[test]
fn initial_hidden_state_seeds_first_step() {
    let mut reg = registry(2, 1);
    reg.add_input("h0", ElementType::F32, vec![2, 1, HIDDEN]);
    let text = generate(
        LstmAttributes::new(HIDDEN).with_direction("bidirectional"),
        basic_inputs().with_initial_h("h0"),
        LstmOutputs::new("Y", "", ""),
        &mut reg,
    );
    assert!(text.contains("\tfloat *op_l_initial_hidden_state = tensor_h0;\n"));
    assert!(text.contains("if (seq == 0) {"));
    assert!(text.contains("} else {"));
    assert!(text.contains(
        "tensor_R, &op_l_n, op_l_initial_hidden_state, &op_l_n, &op_l_alpha, op_l_input_gate + offset, &op_l_n);"
    ));
    assert!(text.contains(
        "tensor_R + 64, &op_l_n, op_l_initial_hidden_state + 4, &op_l_n, &op_l_alpha, op_l_input_gate + offset, &op_l_n);"
    ));
}

#[test]
fn sequence_lengths_mask_and_pick_last_valid_step() {
    let mut reg = registry(1, 2);
    reg.add_input("lens", ElementType::I32, vec![2]);
    let text = generate(
        LstmAttributes::new(HIDDEN),
        basic_inputs().with_sequence_lens("lens"),
        LstmOutputs::new("Y", "Y_h", "Y_c"),
        &mut reg,
    );
    assert!(text.contains("if (seq >= tensor_lens[batch]) {"));
    assert!(text.contains("size_t idx = seq * 8 + batch * 4 + h;"));
    assert!(text.contains("op_l_cell_state[idx] = 0.;"));
    assert!(text.contains("op_l_hidden_state[idx] = 0.;"));
    assert!(text.contains("size_t seq = tensor_lens[batch] - 1;"));
    assert!(text.contains("size_t offset = seq * 8 + batch * 4;"));
    assert!(text.contains("std::copy(op_l_cell_state + offset, op_l_cell_state + offset + 4, tensor_Y_c + y_h_offset);"));
    let mask_at = text.find("if (seq >= tensor_lens[batch])").unwrap();
    let last_activation = text.rfind("op_l_hidden_state[i] = ").unwrap();
    assert!(last_activation < mask_at);
}

#[test]
fn batch_major_layout_copies_at_boundaries() {
    let mut reg = InMemoryRegistry::new();
    reg.add_input("X", ElementType::F32, vec![2, SEQ, INPUT]);
    reg.add_input("W", ElementType::F32, vec![1, 4 * HIDDEN, INPUT]);
    reg.add_input("R", ElementType::F32, vec![1, 4 * HIDDEN, HIDDEN]);
    reg.add_input("h0", ElementType::F32, vec![2, 1, HIDDEN]);
    let text = generate(
        LstmAttributes::new(HIDDEN).with_layout(1),
        basic_inputs().with_initial_h("h0"),
        LstmOutputs::new("Y", "Y_h", ""),
        &mut reg,
    );

    assert!(text.contains("\tfloat op_l_input[12];\n"));
    assert!(text.contains("op_l_input[seq * 4 + batch * 2 + i] = tensor_X[batch * 6 + seq * 2 + i];"));
    assert!(text.contains("\tfloat op_l_initial_hidden_state[8];\n"));
    assert!(text.contains("op_l_initial_hidden_state[batch * 4 + h] = tensor_h0[batch * 4 + h];"));
    assert!(text.contains("\tfloat op_l_hidden_state[24];\n"));
    assert!(text.contains("size_t y_offset = batch * 12 + seq * 4;"));
    assert!(text.contains("std::copy(op_l_hidden_state + offset, op_l_hidden_state + offset + 4, tensor_Y + y_offset);"));
    assert!(text.contains("size_t seq = 2;"));
    assert_eq!(reg.shape_of("Y"), Some(&[2, 3, 1, 4][..]));
    assert_eq!(reg.shape_of("Y_h"), Some(&[2, 1, 4][..]));
}

#[test]
fn clip_saturates_every_gate_and_new_cell_state() {
    let mut reg = registry(1, 1);
    let text = generate(
        LstmAttributes::new(HIDDEN).with_clip(1.5),
        basic_inputs(),
        LstmOutputs::new("Y", "", ""),
        &mut reg,
    );
    assert_eq!(text.matches("float x = (").count(), 5);
    assert!(text.contains("float x = (op_l_cell_gate[i] > -1.5) ? op_l_cell_gate[i] : -1.5;"));
    assert!(text.contains("op_l_new_cell_state[i] = (x < 1.5) ? x : 1.5;"));
}

#[test]
fn buffer_sizes_track_dimensions() {
    for (directions, batch) in [(1, 1), (1, 3), (2, 2), (2, 5)] {
        let mut reg = registry(directions, batch);
        let direction = if directions == 2 { "bidirectional" } else { "forward" };
        let text = generate(
            LstmAttributes::new(HIDDEN).with_direction(direction),
            basic_inputs(),
            LstmOutputs::new("", "Y_h", ""),
            &mut reg,
        );
        let ff = SEQ * batch * HIDDEN;
        let full = SEQ * directions * batch * HIDDEN;
        assert!(text.contains(&format!("float op_l_ff_cell_gate[{ff}];")));
        assert!(text.contains(&format!("float op_l_cell_gate[{full}];")));
        assert!(text.contains(&format!("float op_l_new_cell_state[{full}];")));
        assert!(text.contains(&format!("float op_l_hidden_state[{full}];")));
    }
}

#[test]
fn unsupported_activation_fails_before_any_code() {
    let mut reg = registry(1, 1);
    let mut op = Lstm::new(
        LstmAttributes::new(HIDDEN).with_activations(&["Gelu", "Tanh", "Tanh"]),
        basic_inputs(),
        LstmOutputs::new("Y", "", ""),
    );
    assert_eq!(
        op.initialize(&mut reg),
        Err(LowerError::UnsupportedActivation("Gelu".into()))
    );
    assert!(!reg.exists("Y"));
    assert_eq!(op.generate("l"), Err(LowerError::NotInitialized { op: "LSTM" }));
}

#[test]
fn contract_violations() {
    let mut reg = registry(1, 1);
    let mut op = Lstm::new(
        LstmAttributes::new(HIDDEN),
        LstmInputs::new("X", "W_missing", "R"),
        LstmOutputs::default(),
    );
    assert!(matches!(
        op.initialize(&mut reg),
        Err(LowerError::MissingTensor { tensor, .. }) if tensor == "W_missing"
    ));

    let mut reg = registry(1, 1);
    reg.add_input("X", ElementType::F32, vec![SEQ, INPUT]);
    let mut op = Lstm::new(LstmAttributes::new(HIDDEN), basic_inputs(), LstmOutputs::default());
    assert!(matches!(
        op.initialize(&mut reg),
        Err(LowerError::ShapeRank { actual: 2, .. })
    ));

    let mut reg = registry(1, 1);
    reg.add_input("X", ElementType::F64, vec![SEQ, 1, INPUT]);
    let mut op = Lstm::new(LstmAttributes::new(HIDDEN), basic_inputs(), LstmOutputs::default());
    assert!(matches!(
        op.initialize(&mut reg),
        Err(LowerError::UnsupportedElementType { found: ElementType::F64, .. })
    ));

    let mut reg = registry(1, 1);
    reg.add_input("lens", ElementType::F32, vec![1]);
    let mut op = Lstm::new(
        LstmAttributes::new(HIDDEN),
        basic_inputs().with_sequence_lens("lens"),
        LstmOutputs::default(),
    );
    assert!(matches!(
        op.initialize(&mut reg),
        Err(LowerError::UnsupportedElementType { .. })
    ));

    let mut reg = registry(1, 1);
    reg.add_initializer("B", vec![32], TensorData::F32(vec![0.0; 32]));
    let mut op = Lstm::new(
        LstmAttributes::new(HIDDEN),
        basic_inputs().with_bias("B"),
        LstmOutputs::default(),
    );
    assert!(matches!(
        op.initialize(&mut reg),
        Err(LowerError::ShapeRank { .. })
    ));

    let mut reg = registry(1, 1);
    let mut op = Lstm::new(
        LstmAttributes::new(HIDDEN).with_direction("bidirectional"),
        basic_inputs(),
        LstmOutputs::default(),
    );
    assert!(matches!(
        op.initialize(&mut reg),
        Err(LowerError::ShapeMismatch { .. })
    ));

    // R carries a single direction while W and the attribute say two
    let mut reg = registry(2, 1);
    reg.add_input("R", ElementType::F32, vec![1, 4 * HIDDEN, HIDDEN]);
    let mut op = Lstm::new(
        LstmAttributes::new(HIDDEN).with_direction("bidirectional"),
        basic_inputs(),
        LstmOutputs::new("Y", "", ""),
    );
    assert!(matches!(
        op.initialize(&mut reg),
        Err(LowerError::ShapeMismatch { .. })
    ));
    assert!(!reg.exists("Y"));
    assert!(op.generate("l").is_err());
}

#[test]
fn zero_sized_dimensions_are_rejected() {
    let mut reg = registry(1, 1);
    reg.add_input("X", ElementType::F32, vec![0, 1, INPUT]);
    let mut op = Lstm::new(
        LstmAttributes::new(HIDDEN),
        basic_inputs(),
        LstmOutputs::new("Y", "Y_h", "Y_c"),
    );
    assert!(matches!(
        lower(&mut op, &mut reg, "l"),
        Err(LowerError::ShapeMismatch { .. })
    ));

    let mut reg = InMemoryRegistry::new();
    reg.add_input("X", ElementType::F32, vec![SEQ, 1, INPUT]);
    reg.add_input("W", ElementType::F32, vec![1, 0, INPUT]);
    reg.add_input("R", ElementType::F32, vec![1, 0, 0]);
    reg.add_initializer("B", vec![1, 0], TensorData::F32(Vec::new()));
    let mut op = Lstm::new(
        LstmAttributes::new(0),
        basic_inputs().with_bias("B"),
        LstmOutputs::new("Y", "", ""),
    );
    assert!(matches!(
        lower(&mut op, &mut reg, "l"),
        Err(LowerError::ShapeMismatch { .. })
    ));
    assert_eq!(reg.shape_of("B"), Some(&[1, 0][..]));
}

#[test]
fn initial_states_and_lengths_must_match_dimensions() {
    let mut reg = registry(1, 1);
    reg.add_input("h0", ElementType::F32, vec![1, 1, 1]);
    let mut op = Lstm::new(
        LstmAttributes::new(HIDDEN),
        basic_inputs().with_initial_h("h0"),
        LstmOutputs::default(),
    );
    assert!(matches!(
        op.initialize(&mut reg),
        Err(LowerError::ShapeMismatch { .. })
    ));

    let mut reg = registry(1, 1);
    reg.add_input("c0", ElementType::F32, vec![1, 2, HIDDEN]);
    let mut op = Lstm::new(
        LstmAttributes::new(HIDDEN),
        basic_inputs().with_initial_c("c0"),
        LstmOutputs::default(),
    );
    assert!(matches!(
        op.initialize(&mut reg),
        Err(LowerError::ShapeMismatch { .. })
    ));

    let mut reg = registry(1, 1);
    reg.add_input("lens", ElementType::I64, vec![7]);
    let mut op = Lstm::new(
        LstmAttributes::new(HIDDEN),
        basic_inputs().with_sequence_lens("lens"),
        LstmOutputs::default(),
    );
    assert!(matches!(
        op.initialize(&mut reg),
        Err(LowerError::ShapeMismatch { .. })
    ));

    // batch-major initial state is [B, D, H]
    let mut reg = InMemoryRegistry::new();
    reg.add_input("X", ElementType::F32, vec![2, SEQ, INPUT]);
    reg.add_input("W", ElementType::F32, vec![1, 4 * HIDDEN, INPUT]);
    reg.add_input("R", ElementType::F32, vec![1, 4 * HIDDEN, HIDDEN]);
    reg.add_input("h0", ElementType::F32, vec![1, 2, HIDDEN]);
    let mut op = Lstm::new(
        LstmAttributes::new(HIDDEN).with_layout(1),
        basic_inputs().with_initial_h("h0"),
        LstmOutputs::default(),
    );
    assert!(matches!(
        op.initialize(&mut reg),
        Err(LowerError::ShapeMismatch { .. })
    ));
}

#[test]
fn non_finite_parameters_are_rejected() {
    let mut reg = registry(1, 1);
    let mut attrs = LstmAttributes::new(HIDDEN).with_activations(&["LeakyRelu", "Tanh", "Tanh"]);
    attrs.activation_alpha = vec![f32::NAN];
    let mut op = Lstm::new(attrs, basic_inputs(), LstmOutputs::default());
    assert!(matches!(
        op.initialize(&mut reg),
        Err(LowerError::InvalidAttribute { attribute: "activation_alpha", .. })
    ));

    let mut attrs = LstmAttributes::new(HIDDEN).with_activations(&["Affine", "Tanh", "Tanh"]);
    attrs.activation_beta = vec![f32::INFINITY];
    let mut op = Lstm::new(attrs, basic_inputs(), LstmOutputs::default());
    assert!(matches!(
        op.initialize(&mut reg),
        Err(LowerError::InvalidAttribute { attribute: "activation_beta", .. })
    ));

    let mut op = Lstm::new(
        LstmAttributes::new(HIDDEN).with_clip(f32::INFINITY),
        basic_inputs(),
        LstmOutputs::default(),
    );
    assert!(matches!(
        op.initialize(&mut reg),
        Err(LowerError::InvalidAttribute { attribute: "clip", .. })
    ));
}

#[test]
fn existing_outputs_are_not_reregistered() {
    let mut reg = registry(1, 1);
    reg.add_output("Y", ElementType::F32, vec![3, 1, 1, 4]);
    generate(
        LstmAttributes::new(HIDDEN),
        basic_inputs(),
        LstmOutputs::new("Y", "", ""),
        &mut reg,
    );
    assert_eq!(reg.descriptor("Y").map(|d| d.role), Some(TensorRole::Output));
}

#[test]
fn inference_without_registry() {
    let op = Lstm::new(
        LstmAttributes::new(HIDDEN).with_layout(1),
        basic_inputs(),
        LstmOutputs::default(),
    );
    assert_eq!(
        op.type_inference(&[ElementType::F32, ElementType::F32]).unwrap(),
        vec![ElementType::F32; 3]
    );
    let shapes = op
        .shape_inference(&[vec![5, 3, 2], vec![1, 16, 2]])
        .unwrap();
    assert_eq!(shapes, vec![vec![5, 3, 1, 4], vec![5, 1, 4], vec![5, 1, 4]]);

    let op = Lstm::new(
        LstmAttributes::new(HIDDEN).with_layout(7),
        basic_inputs(),
        LstmOutputs::default(),
    );
    assert!(matches!(
        op.shape_inference(&[vec![5, 3, 2], vec![1, 16, 2]]),
        Err(LowerError::InvalidAttribute { attribute: "layout", .. })
    ));
}

#[test]
fn node_construction_from_json() {
    let mut reg = registry(1, 1);
    let mut op = OperatorKind::from_node(
        "LSTM",
        r#"{"hidden_size": 4, "activations": ["Relu", "Softsign", "Softplus"]}"#,
        &["X", "W", "R"],
        &["Y"],
    )
    .unwrap();
    op.initialize(&mut reg).unwrap();
    let text = op.generate("node/1").unwrap().into_text();
    assert!(text.contains("op_node_1_input_gate[i] = 0.;"));
    assert!(text.contains("op_node_1_cell_gate[i] = op_node_1_cell_gate[i] / (1. + fabs(op_node_1_cell_gate[i]));"));
    assert!(text.contains("op_node_1_new_cell_state[i] = log(1. + exp(op_node_1_new_cell_state[i]));"));
}
