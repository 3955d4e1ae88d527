//! Reflected functions and methods.

use std::fmt;
use std::sync::Arc;

use crate::error::CallError;
use crate::holder::DataHolder;
use crate::metadata::MetadataContainer;
use crate::type_hash::TypeHash;
use crate::type_info::Reflect;

/// Arguments of one call.
pub struct CallFrame<'a> {
    /// Object for methods, null for global functions.
    pub this: *mut u8,
    pub args: &'a [DataHolder],
}

impl CallFrame<'_> {
    pub fn arg<T: Reflect>(&self, index: usize) -> Option<&T> {
        self.args.get(index)?.get::<T>()
    }

    /// The object of a method call.
    ///
    /// # Safety
    ///
    /// `T` must be the class the method was registered on.
    pub unsafe fn this<T>(&mut self) -> Option<&mut T> {
        unsafe { (self.this as *mut T).as_mut() }
    }
}

/// Native implementation of a function.
pub type NativeFn = Arc<dyn Fn(&mut CallFrame<'_>) -> Option<DataHolder> + Send + Sync>;

/// A callable with a reflected signature.
pub struct Function {
    name: String,
    owner: Option<String>,
    params: Vec<String>,
    return_type: Option<String>,
    hash: TypeHash,
    metadata: MetadataContainer,
    native: NativeFn,
}

impl Function {
    pub fn builder(name: &str) -> FunctionBuilder {
        FunctionBuilder {
            name: name.to_owned(),
            params: Vec::new(),
            return_type: None,
            metadata: MetadataContainer::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaring class for methods.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn return_type(&self) -> Option<&str> {
        self.return_type.as_deref()
    }

    pub fn hash(&self) -> TypeHash {
        self.hash
    }

    pub fn metadata(&self) -> &MetadataContainer {
        &self.metadata
    }

    pub fn is_method(&self) -> bool {
        self.owner.is_some()
    }

    /// Call with checked arguments. Methods need a non-null `this`.
    pub fn call(&self, this: *mut u8, args: &[DataHolder]) -> Result<Option<DataHolder>, CallError> {
        if args.len() != self.params.len() {
            return Err(CallError::ArgumentCount {
                function: self.name.clone(),
                expected: self.params.len(),
                got: args.len(),
            });
        }
        for (index, (arg, expected)) in args.iter().zip(&self.params).enumerate() {
            if arg.ty().name() != expected {
                return Err(CallError::ArgumentType {
                    function: self.name.clone(),
                    index,
                    expected: expected.clone(),
                    got: arg.ty().name().to_owned(),
                });
            }
        }
        if self.is_method() && this.is_null() {
            return Err(CallError::MissingObject(self.name.clone()));
        }
        let mut frame = CallFrame { this, args };
        Ok((self.native)(&mut frame))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(param)?;
        }
        f.write_str(")")?;
        if let Some(ret) = &self.return_type {
            write!(f, " -> {ret}")?;
        }
        Ok(())
    }
}

/// Builder for [`Function`].
pub struct FunctionBuilder {
    name: String,
    params: Vec<String>,
    return_type: Option<String>,
    metadata: MetadataContainer,
}

impl FunctionBuilder {
    pub fn param<T: Reflect>(mut self) -> Self {
        self.params.push(T::type_name().into_owned());
        self
    }

    pub fn returns<T: Reflect>(mut self) -> Self {
        self.return_type = Some(T::type_name().into_owned());
        self
    }

    pub fn metadata<M: crate::metadata::Metadata>(self, value: M) -> Self {
        self.metadata.attach(value);
        self
    }

    fn param_hashes(&self) -> Vec<TypeHash> {
        self.params.iter().map(|p| TypeHash::from_name(p)).collect()
    }

    /// Global function.
    pub fn build<F>(self, native: F) -> Function
    where
        F: Fn(&mut CallFrame<'_>) -> Option<DataHolder> + Send + Sync + 'static,
    {
        let hash = TypeHash::from_function(&self.name, &self.param_hashes());
        self.finish(None, hash, Arc::new(native))
    }

    /// Method of class `owner`.
    pub fn build_method<F>(self, owner: &str, native: F) -> Function
    where
        F: Fn(&mut CallFrame<'_>) -> Option<DataHolder> + Send + Sync + 'static,
    {
        let hash = TypeHash::from_method(TypeHash::from_name(owner), &self.name, &self.param_hashes());
        self.finish(Some(owner.to_owned()), hash, Arc::new(native))
    }

    fn finish(self, owner: Option<String>, hash: TypeHash, native: NativeFn) -> Function {
        Function {
            name: self.name,
            owner,
            params: self.params,
            return_type: self.return_type,
            hash,
            metadata: self.metadata,
            native,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{RegistryConfig, TypeRegistry};

    fn add(registry: Arc<TypeRegistry>) -> Function {
        Function::builder("add")
            .param::<i32>()
            .param::<i32>()
            .returns::<i32>()
            .build(move |frame| {
                let sum = frame.arg::<i32>(0)? + frame.arg::<i32>(1)?;
                DataHolder::of(&registry, sum)
            })
    }

    #[test]
    fn call_checks_arguments() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        let function = add(registry.clone());

        let args = [
            DataHolder::of(&registry, 2i32).unwrap(),
            DataHolder::of(&registry, 3i32).unwrap(),
        ];
        let result = function.call(std::ptr::null_mut(), &args).unwrap().unwrap();
        assert_eq!(result.get::<i32>(), Some(&5));

        let err = function.call(std::ptr::null_mut(), &args[..1]).unwrap_err();
        assert!(matches!(err, CallError::ArgumentCount { expected: 2, got: 1, .. }));

        let wrong = [
            DataHolder::of(&registry, 2i32).unwrap(),
            DataHolder::of(&registry, 3.0f32).unwrap(),
        ];
        let err = function.call(std::ptr::null_mut(), &wrong).unwrap_err();
        assert!(matches!(err, CallError::ArgumentType { index: 1, .. }));
    }

    #[test]
    fn signature_affects_hash() {
        let a = Function::builder("f").param::<i32>().build(|_| None);
        let b = Function::builder("f").param::<f32>().build(|_| None);
        assert_ne!(a.hash(), b.hash());
        assert_eq!(format!("{a:?}"), "f(int)");
    }

    #[test]
    fn methods_need_an_object() {
        let method = Function::builder("reset").build_method("Counter", |frame| {
            unsafe { *frame.this::<u32>()? = 0 };
            None
        });
        assert!(method.is_method());
        assert!(matches!(
            method.call(std::ptr::null_mut(), &[]),
            Err(CallError::MissingObject(_))
        ));

        let mut counter = 5u32;
        method.call(&mut counter as *mut u32 as *mut u8, &[]).unwrap();
        assert_eq!(counter, 0);
    }
}
