use crate::simd::F32x8;

#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct WeightAndAccumulator {
    pub weight: f32,
    pub acc_grad: f32,
}

/******************* Adagrad with L2 **************************/
// g = l2 * w + gradient
// acc += g * g
// w -= learning_rate * g / sqrt(acc)
#[derive(Clone, Copy, Debug)]
pub struct OptimizerAdagrad {
    learning_rate: f32,
    l2: f32,
}

impl OptimizerAdagrad {
    pub fn new(learning_rate: f32, l2: f32) -> OptimizerAdagrad {
        OptimizerAdagrad { learning_rate, l2 }
    }

    pub fn get_name() -> &'static str {
        "AdagradL2"
    }

    #[inline(always)]
    pub fn scalar_step(&self, w: &mut WeightAndAccumulator, gradient: f32) {
        let g = self.l2 * w.weight + gradient;
        let acc_grad = w.acc_grad + g * g;
        w.weight -= self.learning_rate * g / acc_grad.sqrt();
        w.acc_grad = acc_grad;
    }

    /// Joint step for the two embedding rows of one interaction, one chunk of lanes at a time.
    /// Both gradients come from the values passed in, nothing is read back in between.
    #[inline(always)]
    pub fn pair_step(
        &self,
        joint: F32x8,
        wa: F32x8,
        wb: F32x8,
        acc_a: F32x8,
        acc_b: F32x8,
    ) -> (F32x8, F32x8, F32x8, F32x8) {
        let l2 = F32x8::splat(self.l2);
        let lr = F32x8::splat(self.learning_rate);

        let ga = l2.mul_add(wa, joint * wb);
        let gb = l2.mul_add(wb, joint * wa);

        let acc_a = ga.mul_add(ga, acc_a);
        let acc_b = gb.mul_add(gb, acc_b);

        let wa = wa - lr * (ga * acc_a.rsqrt());
        let wb = wb - lr * (gb * acc_b.rsqrt());
        (wa, wb, acc_a, acc_b)
    }

    /// Bias keeps its own rule: accumulator grows by the raw gradient, not its square
    #[inline(always)]
    pub fn bias_step(&self, bias: &mut WeightAndAccumulator, gradient: f32) {
        bias.acc_grad += gradient;
        bias.weight -= self.learning_rate * gradient / bias.acc_grad.sqrt();
    }
}
